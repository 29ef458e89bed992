use std::io;
use std::io::prelude::*;

/// A CRC32 checksum in the IEEE 802.3 polynomial used by gzip and zlib.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Crc32(u32);

impl Crc32 {
  pub fn new(value: u32) -> Self {
    Self(value)
  }

  pub fn value(&self) -> u32 {
    self.0
  }

  /// Hashes an in-memory buffer in one shot.
  pub fn of(bytes: &[u8]) -> Self {
    Self(crc32fast::hash(bytes))
  }
}

#[derive(Clone, Debug, Default)]
pub struct CRC32Hasher(crc32fast::Hasher);

impl CRC32Hasher {
  pub fn new() -> Self {
    Self(crc32fast::Hasher::new())
  }

  pub fn update(&mut self, bytes: &[u8]) {
    self.0.update(bytes);
  }

  /// Returns the checksum of everything hashed so far without consuming the
  /// hasher, so a stream wrapper can keep feeding it afterwards.
  pub fn finish(&self) -> Crc32 {
    Crc32(self.0.clone().finalize())
  }

  pub fn reset(&mut self) {
    self.0.reset();
  }
}

/// A [`Read`] adapter that hashes the bytes read from its underlying reader.
///
/// The adapter deliberately implements neither [`Seek`] nor [`BufRead`]:
/// either would let bytes slip past the hasher.
pub struct HashingReader<R> {
  inner: R,
  hasher: CRC32Hasher,
}

impl<R: Read> HashingReader<R> {
  pub fn new(inner: R) -> Self {
    Self { inner, hasher: CRC32Hasher::new() }
  }
}

impl<R> HashingReader<R> {
  pub fn hasher(&self) -> &CRC32Hasher {
    &self.hasher
  }

  pub fn into_inner(self) -> R {
    self.inner
  }
}

impl<R: Read> Read for HashingReader<R> {
  /// Calls [`read`](Read::read) on the inner reader, then hashes the bytes
  /// that were actually produced.
  fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
    let amt = self.inner.read(buf)?;
    self.hasher.update(&buf[..amt]);
    Ok(amt)
  }
}

/// A [`Write`] adapter that hashes the bytes written to its underlying writer.
pub struct HashingWriter<W> {
  inner: W,
  hasher: CRC32Hasher,
}

impl<W: Write> HashingWriter<W> {
  pub fn new(inner: W) -> Self {
    Self { inner, hasher: CRC32Hasher::new() }
  }
}

impl<W> HashingWriter<W> {
  pub fn hasher(&self) -> &CRC32Hasher {
    &self.hasher
  }

  /// Forgets everything hashed so far. This is the truncate-to-zero case;
  /// truncating a hashed stream to any other length is not supported.
  pub fn reset_hasher(&mut self) {
    self.hasher.reset();
  }

  pub fn into_inner(self) -> W {
    self.inner
  }
}

impl<W: Write> Write for HashingWriter<W> {
  /// Calls [`write`](Write::write) on the inner writer, then hashes the bytes
  /// that were successfully written.
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let amt = self.inner.write(buf)?;
    self.hasher.update(&buf[..amt]);
    Ok(amt)
  }

  fn flush(&mut self) -> io::Result<()> {
    self.inner.flush()
  }
}
