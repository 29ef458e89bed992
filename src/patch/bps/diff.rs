use crate::crc::Crc32;
use crate::patch::bps::{Op, OpBuffer};
use std::collections::HashMap;

/// A hashed index from blocksize-byte windows to the offsets where they
/// occur. Collisions are possible; callers weed them out by measuring the
/// actual match (a zero forward span means the window was never there).
struct BlockMap {
  blocks: HashMap<u32, Vec<u32>>,
}

impl BlockMap {
  fn new() -> Self {
    Self { blocks: HashMap::new() }
  }

  fn add_block(&mut self, block: &[u8], offset: usize) {
    // The index stores 4-byte offsets; nothing this crate patches comes
    // anywhere near that limit.
    let Ok(offset) = u32::try_from(offset) else {
      return;
    };
    self.blocks.entry(crc32fast::hash(block)).or_default().push(offset);
  }

  fn get_block(&self, block: &[u8]) -> &[u32] {
    self.blocks.get(&crc32fast::hash(block)).map_or(&[], Vec::as_slice)
  }
}

/// Measures how well `blocksrc` at `source_offset` lines up with `target`
/// at `target_offset`: how many bytes match walking backward from the
/// offsets, and how many walking forward.
fn measure_op(
  blocksrc: &[u8],
  source_offset: usize,
  target: &[u8],
  target_offset: usize,
) -> (usize, usize) {
  let mut backspan = 0;
  let max_back = source_offset.min(target_offset);
  while backspan < max_back
    && blocksrc[source_offset - backspan - 1] == target[target_offset - backspan - 1]
  {
    backspan += 1;
  }

  let mut forespan = 0;
  let max_fore = (blocksrc.len() - source_offset).min(target.len() - target_offset);
  while forespan < max_fore && blocksrc[source_offset + forespan] == target[target_offset + forespan]
  {
    forespan += 1;
  }

  (backspan, forespan)
}

/// Produces an operation sequence that transforms `source` into `target`.
///
/// The builder probes the target one window at a time, prices every copy
/// candidate the block maps surface, and defers to a literal only when no
/// copy pays for its own encoding. Applying the result to `source` yields
/// `target` exactly; the stream always passes validation.
pub fn diff(blocksize: usize, source: &[u8], target: &[u8], metadata: &str) -> Vec<Op> {
  assert!(blocksize > 0, "blocksize must be positive");

  let mut ops = vec![Op::Header {
    source_size: source.len() as u64,
    target_size: target.len() as u64,
    metadata: metadata.to_owned(),
  }];

  // The whole source is available when the patch is applied, so index all
  // of it up front.
  let mut sourcemap = BlockMap::new();
  for offset in (0..source.len()).step_by(blocksize) {
    sourcemap.add_block(&source[offset..(offset + blocksize).min(source.len())], offset);
  }

  // The next target byte not yet covered by an emitted operation.
  let mut target_write_offset: usize = 0;

  // The next target byte the search is probing. When no candidate pays off
  // it runs ahead of the write offset, on the chance that a later window
  // matches and extends backward over the gap.
  let mut target_encoding_offset: usize = 0;

  // Windows of the target become copy candidates once the probe has moved
  // past their starting offset; index them lazily as it advances.
  let mut targetmap = BlockMap::new();
  let mut next_target_block_offset: usize = 0;

  let mut opbuf = OpBuffer::new(target);

  while target_encoding_offset < target.len() {
    while next_target_block_offset < target_encoding_offset {
      let end = (next_target_block_offset + blocksize).min(target.len());
      targetmap.add_block(&target[next_target_block_offset..end], next_target_block_offset);
      next_target_block_offset += blocksize;
    }

    let block_end = (target_encoding_offset + blocksize).min(target.len());
    let block = &target[target_encoding_offset..block_end];

    // The most efficient operation found for this offset so far.
    let mut best_op: Option<Op> = None;
    let mut best_efficiency = 0.0;
    let mut best_backspan = 0;
    let mut best_forespan = 0;

    for &source_offset in sourcemap.get_block(block) {
      let source_offset = source_offset as usize;
      let (backspan, forespan) = measure_op(source, source_offset, target, target_encoding_offset);
      if forespan == 0 {
        // The block doesn't actually occur here; hash collision.
        continue;
      }

      let bytespan = (backspan + forespan) as u64;
      let candidate = if source_offset == target_encoding_offset {
        Op::SourceRead { bytespan }
      } else {
        Op::SourceCopy { bytespan, offset: (source_offset - backspan) as u64 }
      };

      let (source_cursor, target_cursor) = opbuf.copy_offsets(backspan as u64);
      let efficiency = candidate.efficiency(source_cursor, target_cursor);
      if efficiency > best_efficiency {
        best_op = Some(candidate);
        best_efficiency = efficiency;
        best_backspan = backspan;
        best_forespan = forespan;
      }
    }

    for &target_offset in targetmap.get_block(block) {
      let target_offset = target_offset as usize;
      let (backspan, forespan) = measure_op(target, target_offset, target, target_encoding_offset);
      if forespan == 0 {
        continue;
      }

      let candidate = Op::TargetCopy {
        bytespan: (backspan + forespan) as u64,
        offset: (target_offset - backspan) as u64,
      };

      let (source_cursor, target_cursor) = opbuf.copy_offsets(backspan as u64);
      let efficiency = candidate.efficiency(source_cursor, target_cursor);
      if efficiency > best_efficiency {
        best_op = Some(candidate);
        best_efficiency = efficiency;
        best_backspan = backspan;
        best_forespan = forespan;
      }
    }

    // No copy pays for its own encoding here; try the next offset. The
    // uncovered bytes become a literal once something does pay off.
    let Some(best_op) = best_op.filter(|_| best_efficiency >= 1.0) else {
      target_encoding_offset += 1;
      continue;
    };

    if target_write_offset < target_encoding_offset {
      let payload = target[target_write_offset..target_encoding_offset].to_vec();
      opbuf.append(Op::TargetRead { payload }, 0);
      target_write_offset = target_encoding_offset;
    }

    opbuf.append(best_op, best_backspan as u64);

    target_write_offset += best_forespan;
    target_encoding_offset = target_write_offset;
  }

  ops.extend(opbuf.into_ops());

  if target_write_offset < target.len() {
    // Literal all the way to the end.
    ops.push(Op::TargetRead { payload: target[target_write_offset..].to_vec() });
  }

  ops.push(Op::SourceCrc32(Crc32::of(source)));
  ops.push(Op::TargetCrc32(Crc32::of(target)));
  ops
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::patch::bps;

  fn build_and_apply(blocksize: usize, source: &[u8], target: &[u8]) -> Vec<Op> {
    let ops = diff(blocksize, source, target, "");
    bps::check_stream(&ops).unwrap();
    assert_eq!(bps::apply(&ops, source).unwrap(), target, "patch does not reproduce the target");
    ops
  }

  #[test]
  fn identical_buffers_become_one_source_read() {
    let ops = build_and_apply(4, b"abcdefgh", b"abcdefgh");
    assert_eq!(
      ops[..2],
      [
        Op::Header { source_size: 8, target_size: 8, metadata: String::new() },
        Op::SourceRead { bytespan: 8 },
      ]
    );
    assert_eq!(ops.len(), 4);
  }

  #[test]
  fn insertions_become_literals_between_copies() {
    let ops = build_and_apply(4, b"HELLO WORLD", b"HELLO BRAVE WORLD");
    let covers_insertion = ops.iter().any(|op| {
      matches!(op, Op::TargetRead { payload }
        if payload.windows(5).any(|w| w == b"BRAVE"))
    });
    assert!(covers_insertion, "no literal covers the inserted text: {ops:?}");
  }

  #[test]
  fn repeating_runs_become_self_referential_copies() {
    let ops = build_and_apply(4, b"", &[0u8; 16]);
    assert_eq!(
      ops[1..3],
      [
        Op::TargetRead { payload: vec![0] },
        Op::TargetCopy { bytespan: 15, offset: 0 },
      ]
    );
  }

  #[test]
  fn long_runs_from_a_tiny_source() {
    let target = vec![b'A'; 1000];
    let ops = build_and_apply(4, b"A", &target);
    assert!(
      ops.iter().any(|op| matches!(op, Op::TargetCopy { bytespan, offset }
        if *offset + *bytespan > 1 && *bytespan >= 900)),
      "expected a straddling run: {ops:?}"
    );
  }

  #[test]
  fn empty_target_is_just_the_footer() {
    let ops = build_and_apply(4, b"abcdef", b"");
    assert_eq!(ops.len(), 3);
  }

  #[test]
  fn empty_metadata_round_trips() {
    let ops = diff(4, b"abcd", b"abcd", "");
    let decoded = bps::read(&bps::write(&ops).unwrap()).unwrap();
    assert_eq!(decoded, ops);
  }

  #[test]
  fn metadata_is_carried_verbatim() {
    let metadata = r#"{"patcher":"rompatch","title":"t"}"#;
    let ops = diff(4, b"abcd", b"abce", metadata);
    let decoded = bps::read(&bps::write(&ops).unwrap()).unwrap();
    let Op::Header { metadata: decoded_metadata, .. } = &decoded[0] else {
      panic!("missing header");
    };
    assert_eq!(decoded_metadata, metadata);
  }

  #[test]
  fn unrelated_buffers_still_round_trip() {
    let source: Vec<u8> = (0..255u8).collect();
    let target: Vec<u8> = (0..255u8).rev().collect();
    build_and_apply(16, &source, &target);
  }

  #[test]
  fn shuffled_content_round_trips() {
    let source = b"the quick brown fox jumps over the lazy dog".repeat(8);
    let mut target = source.clone();
    target.extend_from_slice(b"and then the dog jumps over the quick brown fox");
    target.rotate_right(13);
    build_and_apply(8, &source, &target);
  }

  #[test]
  fn full_pipeline_round_trips() {
    let source = b"HELLO WORLD".repeat(20);
    let mut target = source.clone();
    target.truncate(180);
    target.extend_from_slice(b"GOODBYE");
    let ops = diff(8, &source, &target, "notes");
    let patch = bps::write(&ops).unwrap();
    let decoded = bps::read(&patch).unwrap();
    assert_eq!(decoded, ops);
    assert_eq!(bps::apply(&decoded, &source).unwrap(), target);
  }
}
