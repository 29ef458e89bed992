use crate::patch::Error;
use crate::patch::bps::{Op, check_stream};

/// Simplifies an operation sequence without changing what it produces.
///
/// A SourceCopy whose offset equals its own write offset is re-expressed as
/// a SourceRead, and neighbouring operations merge where the encoding allows
/// it: adjacent SourceReads, adjacent TargetReads, and copies that continue
/// exactly where the previous one ended. Running the pass twice yields the
/// same stream as running it once.
pub fn optimize(ops: Vec<Op>) -> Result<Vec<Op>, Error> {
  check_stream(&ops)?;

  let mut out: Vec<Op> = Vec::with_capacity(ops.len());
  // Where the next incoming operation will start writing.
  let mut write_offset: u64 = 0;

  for mut op in ops {
    // The conversion happens on arrival so a converted copy can still merge
    // with a read already being accumulated.
    if let Op::SourceCopy { bytespan, offset } = op
      && offset == write_offset
    {
      op = Op::SourceRead { bytespan };
    }
    write_offset += op.bytespan();

    if let Some(last) = out.last_mut()
      && mergeable(last, &op)
    {
      last.extend(op);
      continue;
    }
    out.push(op);
  }

  Ok(out)
}

fn mergeable(last: &Op, next: &Op) -> bool {
  match (last, next) {
    (Op::SourceRead { .. }, Op::SourceRead { .. }) => true,
    (Op::TargetRead { .. }, Op::TargetRead { .. }) => true,
    (
      Op::SourceCopy { bytespan, offset },
      Op::SourceCopy { offset: next_offset, .. },
    )
    | (
      Op::TargetCopy { bytespan, offset },
      Op::TargetCopy { offset: next_offset, .. },
    ) => offset + bytespan == *next_offset,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::crc::Crc32;
  use crate::patch::bps;

  fn footer() -> [Op; 2] {
    [Op::SourceCrc32(Crc32::new(1)), Op::TargetCrc32(Crc32::new(2))]
  }

  fn header(source_size: u64, target_size: u64) -> Op {
    Op::Header { source_size, target_size, metadata: String::new() }
  }

  #[test]
  fn merges_adjacent_reads() {
    let [s, t] = footer();
    let ops = vec![
      header(8, 10),
      Op::SourceRead { bytespan: 3 },
      Op::SourceRead { bytespan: 5 },
      Op::TargetRead { payload: b"a".to_vec() },
      Op::TargetRead { payload: b"b".to_vec() },
      s,
      t,
    ];
    let [s, t] = footer();
    assert_eq!(
      optimize(ops).unwrap(),
      vec![
        header(8, 10),
        Op::SourceRead { bytespan: 8 },
        Op::TargetRead { payload: b"ab".to_vec() },
        s,
        t,
      ]
    );
  }

  #[test]
  fn merges_contiguous_copies_only() {
    let [s, t] = footer();
    let ops = vec![
      header(20, 9),
      Op::SourceCopy { bytespan: 3, offset: 10 },
      Op::SourceCopy { bytespan: 3, offset: 13 },
      Op::SourceCopy { bytespan: 3, offset: 10 },
      s,
      t,
    ];
    let [s, t] = footer();
    assert_eq!(
      optimize(ops).unwrap(),
      vec![
        header(20, 9),
        Op::SourceCopy { bytespan: 6, offset: 10 },
        Op::SourceCopy { bytespan: 3, offset: 10 },
        s,
        t,
      ]
    );
  }

  #[test]
  fn source_copy_at_the_write_offset_becomes_a_read() {
    let [s, t] = footer();
    let ops = vec![
      header(12, 12),
      Op::TargetRead { payload: vec![0; 4] },
      Op::SourceCopy { bytespan: 4, offset: 4 },
      Op::SourceCopy { bytespan: 4, offset: 0 },
      s,
      t,
    ];
    let [s, t] = footer();
    assert_eq!(
      optimize(ops).unwrap(),
      vec![
        header(12, 12),
        Op::TargetRead { payload: vec![0; 4] },
        Op::SourceRead { bytespan: 4 },
        Op::SourceCopy { bytespan: 4, offset: 0 },
        s,
        t,
      ]
    );
  }

  #[test]
  fn converted_copy_merges_with_a_preceding_read() {
    let [s, t] = footer();
    let ops = vec![
      header(8, 8),
      Op::SourceRead { bytespan: 4 },
      Op::SourceCopy { bytespan: 4, offset: 4 },
      s,
      t,
    ];
    let [s, t] = footer();
    assert_eq!(
      optimize(ops).unwrap(),
      vec![header(8, 8), Op::SourceRead { bytespan: 8 }, s, t]
    );
  }

  #[test]
  fn is_idempotent() {
    let source = b"HELLO WORLD".repeat(10);
    let mut target = source.clone();
    target.extend_from_slice(b"HELLO BRAVE WORLD");
    let ops = bps::diff(8, &source, &target, "");
    let once = optimize(ops).unwrap();
    let twice = optimize(once.clone()).unwrap();
    assert_eq!(once, twice);
  }

  #[test]
  fn output_still_applies(){
    let source = b"abcdefgh".repeat(16);
    let mut target = source.clone();
    target[40] = b'!';
    target.rotate_left(24);
    let ops = optimize(bps::diff(8, &source, &target, "")).unwrap();
    bps::check_stream(&ops).unwrap();
    assert_eq!(bps::apply(&ops, &source).unwrap(), target);
  }

  #[test]
  fn rejects_malformed_input() {
    assert!(matches!(optimize(vec![Op::SourceRead { bytespan: 1 }]), Err(Error::BadPatch)));
  }
}
