use crate::crc::HashingWriter;
use crate::patch::Error;
use crate::patch::bps::{Op, Validator};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::prelude::*;

/// Encodes an operation sequence into BPS patch bytes.
///
/// The sequence is validated as it is encoded, so a malformed stream fails
/// before producing output. The trailing four bytes are the CRC32 of
/// everything written before them.
pub fn write(ops: &[Op]) -> Result<Vec<u8>, Error> {
  let mut validator = Validator::new();
  let mut out = HashingWriter::new(Vec::new());

  let mut source_relative_offset: u64 = 0;
  let mut target_relative_offset: u64 = 0;
  let mut scratch = Vec::new();
  for op in ops {
    validator.check(op)?;
    scratch.clear();
    op.encode_into(source_relative_offset, target_relative_offset, &mut scratch);
    out.write_all(&scratch)?;
    match op {
      Op::SourceCopy { bytespan, offset } => source_relative_offset = offset + bytespan,
      Op::TargetCopy { bytespan, offset } => target_relative_offset = offset + bytespan,
      _ => {}
    }
  }
  validator.finish()?;

  let patch_crc32 = out.hasher().finish();
  out.write_u32::<LittleEndian>(patch_crc32.value())?;
  Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crc::Crc32;
  use crate::patch::bps;

  fn sample_stream() -> Vec<Op> {
    vec![
      Op::Header { source_size: 8, target_size: 13, metadata: "meta".into() },
      Op::SourceRead { bytespan: 4 },
      Op::TargetRead { payload: b"xyz".to_vec() },
      Op::SourceCopy { bytespan: 3, offset: 1 },
      Op::TargetCopy { bytespan: 3, offset: 2 },
      Op::SourceCrc32(Crc32::new(0x11111111)),
      Op::TargetCrc32(Crc32::new(0x22222222)),
    ]
  }

  #[test]
  fn stream_round_trips_through_the_binary_form() {
    let ops = sample_stream();
    let patch = write(&ops).unwrap();
    assert_eq!(bps::read(&patch).unwrap(), ops);
  }

  #[test]
  fn empty_target_round_trips() {
    let ops = vec![
      Op::Header { source_size: 0, target_size: 0, metadata: String::new() },
      Op::SourceCrc32(Crc32::new(0)),
      Op::TargetCrc32(Crc32::new(0)),
    ];
    let patch = write(&ops).unwrap();
    assert_eq!(bps::read(&patch).unwrap(), ops);
  }

  #[test]
  fn trailer_is_the_crc_of_everything_before_it() {
    let patch = write(&sample_stream()).unwrap();
    let body = &patch[..patch.len() - 4];
    let trailer = u32::from_le_bytes(patch[patch.len() - 4..].try_into().unwrap());
    assert_eq!(Crc32::of(body).value(), trailer);
  }

  #[test]
  fn tampering_is_detected() {
    let mut patch = write(&sample_stream()).unwrap();
    // Flip one bit in the body.
    patch[6] ^= 0x01;
    assert!(matches!(bps::read(&patch), Err(crate::patch::Error::BadPatch)));
  }

  #[test]
  fn malformed_streams_do_not_encode() {
    let ops = vec![
      Op::Header { source_size: 0, target_size: 4, metadata: String::new() },
      Op::SourceRead { bytespan: 4 },
    ];
    assert!(matches!(write(&ops), Err(crate::patch::Error::BadPatch)));
  }
}
