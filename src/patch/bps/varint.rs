use byteorder::ReadBytesExt;
use checked::Checked;
use std::io;
use std::io::prelude::*;

pub trait ReadNumber: Read {
  /// Reads a BPS variable-length integer.
  ///
  /// Every continuation digit carries an implicit +1, so each number has
  /// exactly one encoding. In the specification for the BPS format, this
  /// function is called `decode`.
  ///
  /// # Errors
  /// If the value overflows a u64, this function returns an
  /// [InvalidData](io::ErrorKind::InvalidData) error. If the stream ends
  /// before a terminator byte, it returns the underlying
  /// [UnexpectedEof](io::ErrorKind::UnexpectedEof) error.
  fn read_number(&mut self) -> io::Result<u64> {
    let mut data: u64 = 0;
    let mut shift = Checked::<u64>::new(1);
    loop {
      let byte = self.read_u8()?;
      let new_value: u64 = (u64::from(byte & 0x7F) * shift + data) //
        .ok_or_else(overflow_err)?;
      if is_msb_set(byte) {
        return Ok(new_value);
      }
      // equivalent to `shift << 7`, but multiplication will check for overflow
      shift = shift * 128;
      // The encoder subtracts 1 after emitting each continuation digit.
      // Adding the shift after decoding each byte reverses that operation.
      data = (new_value + shift).ok_or_else(overflow_err)?;
    }
  }
}

impl<R> ReadNumber for R where R: Read {}

/// Appends the encoding of `number` to `buf`.
pub fn write_number(mut number: u64, buf: &mut Vec<u8>) {
  loop {
    let low = (number & 0x7F) as u8;
    number >>= 7;
    if number == 0 {
      buf.push(low | 0x80);
      return;
    }
    buf.push(low);
    number -= 1;
  }
}

/// Returns the length of the encoding of `number` without producing it.
pub fn measure_number(mut number: u64) -> u64 {
  let mut length = 1;
  while number >> 7 != 0 {
    number = (number >> 7) - 1;
    length += 1;
  }
  length
}

fn overflow_err() -> io::Error {
  io::Error::from(io::ErrorKind::InvalidData)
}

fn is_msb_set(byte: u8) -> bool {
  byte & 0x80 == 0x80
}
