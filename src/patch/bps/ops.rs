use crate::crc::Crc32;
use crate::patch::bps;
use crate::patch::bps::varint;

/// A single BPS patch operation.
///
/// A patch is a finite sequence of operations: a `Header`, body operations
/// whose bytespans cover the target exactly, then the two content checksums.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
  Header { source_size: u64, target_size: u64, metadata: String },
  SourceRead { bytespan: u64 },
  TargetRead { payload: Vec<u8> },
  SourceCopy { bytespan: u64, offset: u64 },
  TargetCopy { bytespan: u64, offset: u64 },
  SourceCrc32(Crc32),
  TargetCrc32(Crc32),
}

impl Op {
  /// The number of target bytes this operation produces.
  pub fn bytespan(&self) -> u64 {
    match self {
      Op::SourceRead { bytespan } => *bytespan,
      Op::TargetRead { payload } => payload.len() as u64,
      Op::SourceCopy { bytespan, .. } => *bytespan,
      Op::TargetCopy { bytespan, .. } => *bytespan,
      Op::Header { .. } | Op::SourceCrc32(_) | Op::TargetCrc32(_) => 0,
    }
  }

  /// Appends this operation's encoding to `buf`.
  ///
  /// `source_cursor` is the running relative offset used when encoding
  /// SourceCopy operations, `target_cursor` the one used for TargetCopy.
  pub fn encode_into(&self, source_cursor: u64, target_cursor: u64, buf: &mut Vec<u8>) {
    match self {
      Op::Header { source_size, target_size, metadata } => {
        buf.extend_from_slice(bps::MAGIC);
        varint::write_number(*source_size, buf);
        varint::write_number(*target_size, buf);
        varint::write_number(metadata.len() as u64, buf);
        buf.extend_from_slice(metadata.as_bytes());
      }
      Op::SourceRead { bytespan } => {
        varint::write_number(hunk_word(*bytespan, bps::OP_SOURCEREAD), buf);
      }
      Op::TargetRead { payload } => {
        varint::write_number(hunk_word(payload.len() as u64, bps::OP_TARGETREAD), buf);
        buf.extend_from_slice(payload);
      }
      Op::SourceCopy { bytespan, offset } => {
        varint::write_number(hunk_word(*bytespan, bps::OP_SOURCECOPY), buf);
        varint::write_number(signed_word(*offset, source_cursor), buf);
      }
      Op::TargetCopy { bytespan, offset } => {
        varint::write_number(hunk_word(*bytespan, bps::OP_TARGETCOPY), buf);
        varint::write_number(signed_word(*offset, target_cursor), buf);
      }
      Op::SourceCrc32(crc) | Op::TargetCrc32(crc) => {
        buf.extend_from_slice(&crc.value().to_le_bytes());
      }
    }
  }

  /// The length of the encoding [`encode_into`](Self::encode_into) produces,
  /// without producing it.
  pub fn encoded_size(&self, source_cursor: u64, target_cursor: u64) -> u64 {
    match self {
      Op::Header { source_size, target_size, metadata } => {
        bps::MAGIC.len() as u64
          + varint::measure_number(*source_size)
          + varint::measure_number(*target_size)
          + varint::measure_number(metadata.len() as u64)
          + metadata.len() as u64
      }
      Op::SourceRead { bytespan } => {
        varint::measure_number(hunk_word(*bytespan, bps::OP_SOURCEREAD))
      }
      Op::TargetRead { payload } => {
        varint::measure_number(hunk_word(payload.len() as u64, bps::OP_TARGETREAD))
          + payload.len() as u64
      }
      Op::SourceCopy { bytespan, offset } => {
        varint::measure_number(hunk_word(*bytespan, bps::OP_SOURCECOPY))
          + varint::measure_number(signed_word(*offset, source_cursor))
      }
      Op::TargetCopy { bytespan, offset } => {
        varint::measure_number(hunk_word(*bytespan, bps::OP_TARGETCOPY))
          + varint::measure_number(signed_word(*offset, target_cursor))
      }
      Op::SourceCrc32(_) | Op::TargetCrc32(_) => size_of::<u32>() as u64,
    }
  }

  /// Target bytes produced per encoded byte, at the given cursor state.
  pub fn efficiency(&self, source_cursor: u64, target_cursor: u64) -> f64 {
    self.bytespan() as f64 / self.encoded_size(source_cursor, target_cursor) as f64
  }

  /// Reduces this operation's bytespan by `|length|` bytes.
  ///
  /// A positive `length` shrinks from the front (advancing the offset of a
  /// copy operation by the same amount); a negative one shrinks from the
  /// tail, much like a slicing index.
  ///
  /// # Panics
  /// Panics if `length` is zero, if `|length|` is not less than the bytespan,
  /// or if the operation is a header or checksum.
  pub fn shrink(&mut self, length: i64) {
    let amount = length.unsigned_abs();
    assert!(amount != 0, "cannot shrink by zero bytes");
    assert!(
      amount < self.bytespan(),
      "cannot shrink {amount} bytes from an operation spanning {}",
      self.bytespan()
    );
    match self {
      Op::SourceRead { bytespan } => *bytespan -= amount,
      Op::TargetRead { payload } => {
        if length > 0 {
          payload.drain(..amount as usize);
        } else {
          payload.truncate(payload.len() - amount as usize);
        }
      }
      Op::SourceCopy { bytespan, offset } | Op::TargetCopy { bytespan, offset } => {
        *bytespan -= amount;
        if length > 0 {
          *offset += amount;
        }
      }
      Op::Header { .. } | Op::SourceCrc32(_) | Op::TargetCrc32(_) => {
        panic!("cannot shrink {self:?}")
      }
    }
  }

  /// Concatenates `other` onto this operation.
  ///
  /// # Panics
  /// Panics if the operations are of different kinds, if a copy pair is not
  /// contiguous, or if the operation is a header or checksum.
  pub fn extend(&mut self, other: Op) {
    match (self, other) {
      (Op::SourceRead { bytespan }, Op::SourceRead { bytespan: more }) => *bytespan += more,
      (Op::TargetRead { payload }, Op::TargetRead { payload: more }) => {
        payload.extend_from_slice(&more);
      }
      (
        Op::SourceCopy { bytespan, offset },
        Op::SourceCopy { bytespan: more, offset: next },
      )
      | (
        Op::TargetCopy { bytespan, offset },
        Op::TargetCopy { bytespan: more, offset: next },
      ) => {
        assert!(
          *offset + *bytespan == next,
          "cannot extend a copy ending at {} with one starting at {next}",
          *offset + *bytespan
        );
        *bytespan += more;
      }
      (this, other) => panic!("cannot extend {this:?} with {other:?}"),
    }
  }
}

/// The efficiency of a short run of operations, tracking the cursor updates
/// each copy applies before pricing the next.
pub fn sequence_efficiency(ops: &[&Op], source_cursor: u64, target_cursor: u64) -> f64 {
  let mut source_cursor = source_cursor;
  let mut target_cursor = target_cursor;
  let mut total_bytespan = 0u64;
  let mut total_encoded = 0u64;
  for op in ops {
    total_bytespan += op.bytespan();
    total_encoded += op.encoded_size(source_cursor, target_cursor);
    match op {
      Op::SourceCopy { bytespan, offset } => source_cursor = offset + bytespan,
      Op::TargetCopy { bytespan, offset } => target_cursor = offset + bytespan,
      _ => {}
    }
  }
  total_bytespan as f64 / total_encoded as f64
}

fn hunk_word(bytespan: u64, opcode: u64) -> u64 {
  (bytespan - 1) << bps::OPCODESHIFT | opcode
}

/// Copy offsets are emitted relative to the running cursor, with the sign in
/// the low bit.
fn signed_word(offset: u64, cursor: u64) -> u64 {
  let relative = offset.wrapping_sub(cursor) as i64;
  (relative.unsigned_abs() << 1) | u64::from(relative < 0)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bytespans() {
    assert_eq!(Op::Header { source_size: 4, target_size: 9, metadata: String::new() }.bytespan(), 0);
    assert_eq!(Op::SourceRead { bytespan: 12 }.bytespan(), 12);
    assert_eq!(Op::TargetRead { payload: b"abc".to_vec() }.bytespan(), 3);
    assert_eq!(Op::SourceCrc32(Crc32::new(0)).bytespan(), 0);
  }

  #[test]
  fn header_encoding_includes_magic_and_metadata() {
    let op = Op::Header { source_size: 0, target_size: 1, metadata: "hi".into() };
    let mut buf = Vec::new();
    op.encode_into(0, 0, &mut buf);
    assert_eq!(buf, b"BPS1\x80\x81\x82hi");
    assert_eq!(op.encoded_size(0, 0), buf.len() as u64);
  }

  #[test]
  fn copy_encoding_is_cursor_relative() {
    let op = Op::SourceCopy { bytespan: 3, offset: 5 };
    let mut buf = Vec::new();
    // (3 - 1) << 2 | 0b10 = 10; delta +5 encodes as 5 << 1 = 10.
    op.encode_into(0, 0, &mut buf);
    assert_eq!(buf, [0x8A, 0x8A]);

    // Same op behind the cursor: delta -5 sets the sign bit.
    buf.clear();
    op.encode_into(10, 0, &mut buf);
    assert_eq!(buf, [0x8A, 0x8B]);

    // Zero delta.
    buf.clear();
    op.encode_into(5, 0, &mut buf);
    assert_eq!(buf, [0x8A, 0x80]);
  }

  #[test]
  fn encoded_size_matches_encoding() {
    let ops = [
      Op::SourceRead { bytespan: 200 },
      Op::TargetRead { payload: vec![7; 40] },
      Op::SourceCopy { bytespan: 9, offset: 1000 },
      Op::TargetCopy { bytespan: 70, offset: 2 },
      Op::SourceCrc32(Crc32::new(0xDEADBEEF)),
    ];
    for op in &ops {
      for cursor in [0, 3, 5000] {
        let mut buf = Vec::new();
        op.encode_into(cursor, cursor, &mut buf);
        assert_eq!(op.encoded_size(cursor, cursor), buf.len() as u64, "{op:?} at {cursor}");
      }
    }
  }

  #[test]
  fn shrink_from_either_end() {
    let mut op = Op::SourceCopy { bytespan: 10, offset: 100 };
    op.shrink(3);
    assert_eq!(op, Op::SourceCopy { bytespan: 7, offset: 103 });
    op.shrink(-2);
    assert_eq!(op, Op::SourceCopy { bytespan: 5, offset: 103 });

    let mut op = Op::TargetRead { payload: b"abcdef".to_vec() };
    op.shrink(2);
    assert_eq!(op, Op::TargetRead { payload: b"cdef".to_vec() });
    op.shrink(-1);
    assert_eq!(op, Op::TargetRead { payload: b"cde".to_vec() });
  }

  #[test]
  #[should_panic(expected = "cannot shrink")]
  fn shrink_past_bytespan_panics() {
    Op::SourceRead { bytespan: 4 }.shrink(4);
  }

  #[test]
  #[should_panic(expected = "cannot shrink")]
  fn shrink_header_panics() {
    Op::Header { source_size: 0, target_size: 0, metadata: String::new() }.shrink(1);
  }

  #[test]
  fn extend_contiguous_copies() {
    let mut op = Op::TargetCopy { bytespan: 4, offset: 8 };
    op.extend(Op::TargetCopy { bytespan: 2, offset: 12 });
    assert_eq!(op, Op::TargetCopy { bytespan: 6, offset: 8 });
  }

  #[test]
  #[should_panic(expected = "cannot extend")]
  fn extend_non_contiguous_copies_panics() {
    Op::SourceCopy { bytespan: 4, offset: 8 }.extend(Op::SourceCopy { bytespan: 2, offset: 13 });
  }

  #[test]
  #[should_panic(expected = "cannot extend")]
  fn extend_mismatched_kinds_panics() {
    Op::SourceRead { bytespan: 4 }.extend(Op::TargetRead { payload: vec![0] });
  }

  #[test]
  fn sequence_efficiency_tracks_cursors() {
    // After the first copy the source cursor sits at 10, so the second copy
    // encodes a zero delta and the pair prices better than either would
    // against a stale cursor.
    let a = Op::SourceCopy { bytespan: 8, offset: 2 };
    let b = Op::SourceCopy { bytespan: 8, offset: 10 };
    let eff = sequence_efficiency(&[&a, &b], 0, 0);
    // Each op encodes in 2 bytes: 16 target bytes over 4 patch bytes.
    assert_eq!(eff, 4.0);
  }
}
