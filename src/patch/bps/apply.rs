use crate::patch::Error::{self, BadPatch};
use crate::patch::bps::{Op, Validator};

/// Applies an operation sequence to `source`, producing the target bytes.
pub fn apply(ops: &[Op], source: &[u8]) -> Result<Vec<u8>, Error> {
  apply_with_header(ops, source, 0)
}

/// Applies an operation sequence, compensating for a ROM header the patch
/// was not aware of.
///
/// `snes_header` (0 or 0x200) is subtracted from every write offset; copy
/// offsets inside the operations are used as-is. The checksum operations are
/// informational here; callers wanting verification compare them against
/// [`Crc32::of`](crate::crc::Crc32::of) of the buffers themselves.
pub fn apply_with_header(ops: &[Op], source: &[u8], snes_header: u64) -> Result<Vec<u8>, Error> {
  let Some(Op::Header { target_size, .. }) = ops.first() else {
    return Err(BadPatch);
  };
  let target_size = usize::try_from(*target_size).map_err(|_| Error::FileTooLarge)?;
  let mut target = vec![0u8; target_size];

  let mut validator = Validator::new();
  let mut write_offset: i64 = -(snes_header as i64);
  for op in ops {
    validator.check(op)?;
    match op {
      Op::SourceRead { bytespan } => {
        let (start, len) = span(write_offset, *bytespan)?;
        let from = slice(source, start, len)?;
        slice_mut(&mut target, start, len)?.copy_from_slice(from);
      }
      Op::TargetRead { payload } => {
        let (start, len) = span(write_offset, payload.len() as u64)?;
        slice_mut(&mut target, start, len)?.copy_from_slice(payload);
      }
      Op::SourceCopy { bytespan, offset } => {
        let (start, len) = span(write_offset, *bytespan)?;
        let from_start = usize::try_from(*offset).map_err(|_| BadPatch)?;
        // Two distinct buffers, so the whole span copies at once.
        let from = slice(source, from_start, len)?;
        slice_mut(&mut target, start, len)?.copy_from_slice(from);
      }
      Op::TargetCopy { bytespan, offset } => {
        // The read range may overlap the bytes being written (that's how
        // repeating runs work), so this must copy one byte at a time.
        let (start, len) = span(write_offset, *bytespan)?;
        let from_start = usize::try_from(*offset).map_err(|_| BadPatch)?;
        if from_start.checked_add(len).is_none_or(|end| end > target.len())
          || start.checked_add(len).is_none_or(|end| end > target.len())
        {
          return Err(BadPatch);
        }
        for i in 0..len {
          target[start + i] = target[from_start + i];
        }
      }
      Op::Header { .. } | Op::SourceCrc32(_) | Op::TargetCrc32(_) => {}
    }
    write_offset += op.bytespan() as i64;
  }
  validator.finish()?;

  Ok(target)
}

fn span(write_offset: i64, bytespan: u64) -> Result<(usize, usize), Error> {
  let start = usize::try_from(write_offset).map_err(|_| BadPatch)?;
  let len = usize::try_from(bytespan).map_err(|_| BadPatch)?;
  Ok((start, len))
}

fn slice(buf: &[u8], start: usize, len: usize) -> Result<&[u8], Error> {
  let end = start.checked_add(len).ok_or(BadPatch)?;
  buf.get(start..end).ok_or(BadPatch)
}

fn slice_mut(buf: &mut [u8], start: usize, len: usize) -> Result<&mut [u8], Error> {
  let end = start.checked_add(len).ok_or(BadPatch)?;
  buf.get_mut(start..end).ok_or(BadPatch)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crc::Crc32;

  fn with_footer(mut ops: Vec<Op>, source: &[u8], target: &[u8]) -> Vec<Op> {
    ops.push(Op::SourceCrc32(Crc32::of(source)));
    ops.push(Op::TargetCrc32(Crc32::of(target)));
    ops
  }

  #[test]
  fn replays_each_operation_kind() {
    let source = b"HELLO WORLD";
    let target = b"HELLO BRAVE WORLD";
    let ops = with_footer(
      vec![
        Op::Header { source_size: 11, target_size: 17, metadata: String::new() },
        Op::SourceRead { bytespan: 6 },
        Op::TargetRead { payload: b"BRAVE".to_vec() },
        Op::SourceCopy { bytespan: 6, offset: 5 },
      ],
      source,
      target,
    );
    assert_eq!(apply(&ops, source).unwrap(), target);
  }

  #[test]
  fn target_copy_implements_repeating_runs() {
    let source = b"A";
    let target = vec![b'A'; 1000];
    let ops = with_footer(
      vec![
        Op::Header { source_size: 1, target_size: 1000, metadata: String::new() },
        Op::TargetRead { payload: b"A".to_vec() },
        Op::TargetCopy { bytespan: 999, offset: 0 },
      ],
      source,
      &target,
    );
    assert_eq!(apply(&ops, source).unwrap(), target);
  }

  #[test]
  fn empty_target_applies_to_nothing() {
    let ops = with_footer(
      vec![Op::Header { source_size: 3, target_size: 0, metadata: String::new() }],
      b"abc",
      b"",
    );
    assert_eq!(apply(&ops, b"abc").unwrap(), b"");
  }

  #[test]
  fn snes_header_shifts_writes_down() {
    // The patch was made against headerless buffers; the caller passes the
    // header size so the shifted source reads still line up.
    let source = b"....ABCD";
    let ops = with_footer(
      vec![
        Op::Header { source_size: 4, target_size: 4, metadata: String::new() },
        Op::SourceRead { bytespan: 4 },
      ],
      b"ABCD",
      b"ABCD",
    );
    // With a 4-byte header the write offset starts at -4; the first 4
    // target bytes then never receive the source's "ABCD".
    assert!(matches!(apply_with_header(&ops, source, 4), Err(BadPatch)));
  }

  #[test]
  fn rejects_streams_without_a_header() {
    assert!(matches!(apply(&[Op::SourceRead { bytespan: 1 }], b"x"), Err(BadPatch)));
  }
}
