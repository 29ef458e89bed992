use crate::crc::{Crc32, HashingReader};
use crate::patch::Error::{self, BadPatch};
use crate::patch::bps;
use crate::patch::bps::Op;
use crate::patch::bps::varint::ReadNumber;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io;
use std::io::prelude::*;

/// Decodes a BPS patch into its operation sequence.
///
/// The decoder checks the whole-patch CRC32 in the footer against the bytes
/// it read; the stream itself is not validated here, so run it through
/// [`check_stream`](super::check_stream) (or a [`Validator`](super::Validator))
/// before trusting it.
pub fn read(patch: &[u8]) -> Result<Vec<Op>, Error> {
  if patch.len() < bps::MAGIC.len() + bps::FOOTER_LEN {
    return Err(BadPatch);
  }
  let patch_len = patch.len() as u64;
  let mut patch = HashingReader::new(patch);

  let mut magic = [0u8; 4];
  patch.read_exact(&mut magic)?;
  if magic != bps::MAGIC {
    return Err(BadPatch);
  }

  let source_size: u64 = patch.read_number()?;
  let target_size: u64 = patch.read_number()?;
  let metadata_size: u64 = patch.read_number()?;
  if metadata_size > patch_len {
    return Err(BadPatch);
  }
  let mut metadata = vec![0u8; metadata_size as usize];
  patch.read_exact(&mut metadata)?;
  let metadata = String::from_utf8(metadata).map_err(|_| BadPatch)?;

  let mut ops = vec![Op::Header { source_size, target_size, metadata }];

  let mut target_write_offset: u64 = 0;
  let mut source_relative_offset: u64 = 0;
  let mut target_relative_offset: u64 = 0;
  while target_write_offset < target_size {
    let value: u64 = patch.read_number()?;
    let bytespan = (value >> bps::OPCODESHIFT) + 1;
    match value & bps::OPCODEMASK {
      bps::OP_SOURCEREAD => ops.push(Op::SourceRead { bytespan }),
      bps::OP_TARGETREAD => {
        if bytespan > patch_len {
          return Err(BadPatch);
        }
        let mut payload = vec![0u8; bytespan as usize];
        patch.read_exact(&mut payload)?;
        ops.push(Op::TargetRead { payload });
      }
      bps::OP_SOURCECOPY => {
        source_relative_offset = source_relative_offset
          .checked_add_signed(patch.read_signed_number()?)
          .ok_or(BadPatch)?;
        ops.push(Op::SourceCopy { bytespan, offset: source_relative_offset });
        source_relative_offset =
          source_relative_offset.checked_add(bytespan).ok_or(BadPatch)?;
      }
      _ => {
        target_relative_offset = target_relative_offset
          .checked_add_signed(patch.read_signed_number()?)
          .ok_or(BadPatch)?;
        ops.push(Op::TargetCopy { bytespan, offset: target_relative_offset });
        target_relative_offset =
          target_relative_offset.checked_add(bytespan).ok_or(BadPatch)?;
      }
    }
    target_write_offset = target_write_offset.checked_add(bytespan).ok_or(BadPatch)?;
  }

  ops.push(Op::SourceCrc32(Crc32::new(patch.read_u32::<LittleEndian>()?)));
  ops.push(Op::TargetCrc32(Crc32::new(patch.read_u32::<LittleEndian>()?)));

  // Everything up to here is covered by the trailing whole-patch checksum.
  let actual = patch.hasher().finish();
  let expected = Crc32::new(patch.read_u32::<LittleEndian>()?);
  if actual != expected {
    return Err(BadPatch);
  }

  Ok(ops)
}

trait ReadSigned: Read + ReadNumber {
  /// Copy offsets are encoded with the sign in the low bit.
  fn read_signed_number(&mut self) -> io::Result<i64> {
    let encoded: u64 = self.read_number()?;
    // 63 bits always fit in an i64.
    Ok(((encoded >> 1) as i64) * (if encoded & 1 == 1 { -1 } else { 1 }))
  }
}

impl<R: Read> ReadSigned for R {}
