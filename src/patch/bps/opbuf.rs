use crate::patch::bps::ops::{Op, sequence_efficiency};

/// A committed operation plus the cursor state in effect just after it.
///
/// The cached copy cursors are the ones the writer's relative-offset encoding
/// will see, which is what candidate pricing needs.
#[derive(Clone, Debug)]
struct Row {
  op: Op,
  write_offset: u64,
  source_cursor: u64,
  target_cursor: u64,
}

/// A mutable sequence of body operations that supports rolling back the tail.
///
/// Appending with a nonzero `rollback` means the new operation overlaps the
/// last `rollback` bytes already emitted; the buffer discards or rewrites
/// whatever the overlap displaces, keeping whichever rewrite encodes best.
pub struct OpBuffer<'t> {
  target: &'t [u8],
  rows: Vec<Row>,
}

impl<'t> OpBuffer<'t> {
  pub fn new(target: &'t [u8]) -> Self {
    Self { target, rows: Vec::new() }
  }

  fn push(&mut self, op: Op) {
    let (mut write_offset, mut source_cursor, mut target_cursor) = match self.rows.last() {
      Some(row) => (row.write_offset, row.source_cursor, row.target_cursor),
      None => (0, 0, 0),
    };
    write_offset += op.bytespan();
    match &op {
      Op::SourceCopy { bytespan, offset } => source_cursor = offset + bytespan,
      Op::TargetCopy { bytespan, offset } => target_cursor = offset + bytespan,
      _ => {}
    }
    self.rows.push(Row { op, write_offset, source_cursor, target_cursor });
  }

  /// Commits `op`, overlapping the last `rollback` already-emitted bytes.
  ///
  /// # Panics
  /// Panics if `rollback` is not smaller than the bytes the new operation
  /// and the buffered tail can absorb between them.
  pub fn append(&mut self, mut op: Op, mut rollback: u64) {
    // A big enough rollback swallows whole operations off the tail.
    while let Some(last) = self.rows.last() {
      if rollback < last.op.bytespan() {
        break;
      }
      rollback -= last.op.bytespan();
      self.rows.pop();
    }

    if rollback > 0 && !self.rows.is_empty() {
      self.resolve_overlap(&mut op, rollback);
    } else if rollback > 0 {
      // Rolling back past the first operation: the new op just gets shorter.
      op.shrink(rollback as i64);
    }

    self.push(op);
  }

  /// The overlap straddles the previous operation. Three rewrites are
  /// possible; keep the one that encodes best, priced against the cursor
  /// state in effect before the previous operation (options 2 and 3 change
  /// the cursor the new op would otherwise see).
  fn resolve_overlap(&mut self, op: &mut Op, rollback: u64) {
    // The caller only gets here with at least one row left.
    let prev = self.rows.last().unwrap().op.clone();
    let (start_write, start_source, start_target) = match self.rows.len().checked_sub(2) {
      Some(i) => {
        let row = &self.rows[i];
        (row.write_offset, row.source_cursor, row.target_cursor)
      }
      None => (0, 0, 0),
    };

    // Option 1: shrink the new operation from the front, leave the previous
    // operation alone.
    let mut opt1_new = op.clone();
    opt1_new.shrink(rollback as i64);
    let opt1 = sequence_efficiency(&[&prev, &opt1_new], start_source, start_target);

    // Option 2: shrink the previous operation's tail, leave the new one alone.
    let mut opt2_prev = prev.clone();
    opt2_prev.shrink(-(rollback as i64));
    let opt2 = sequence_efficiency(&[&opt2_prev, op], start_source, start_target);

    // Option 3: replace the previous operation with the literal bytes it
    // produced, truncated by the overlap, and leave the new one alone.
    let literal_start = start_write as usize;
    let literal_end = literal_start + (prev.bytespan() - rollback) as usize;
    let opt3_prev = Op::TargetRead { payload: self.target[literal_start..literal_end].to_vec() };
    let opt3 = sequence_efficiency(&[&opt3_prev, op], start_source, start_target);

    if opt1 >= opt2 && opt1 >= opt3 {
      *op = opt1_new;
    } else if opt2 >= opt3 {
      self.rows.pop();
      self.push(opt2_prev);
    } else {
      self.rows.pop();
      // Adjacent literals merge into one TargetRead.
      if matches!(self.rows.last(), Some(row) if matches!(row.op, Op::TargetRead { .. })) {
        let mut merged = self.rows.pop().unwrap().op;
        merged.extend(opt3_prev);
        self.push(merged);
      } else {
        self.push(opt3_prev);
      }
    }
  }

  /// The copy-cursor pair in effect `rollback` bytes before the current
  /// write frontier, for pricing a candidate that reaches that far back.
  pub fn copy_offsets(&self, mut rollback: u64) -> (u64, u64) {
    let mut offsets = (0, 0);
    for row in self.rows.iter().rev() {
      offsets = (row.source_cursor, row.target_cursor);
      if rollback < row.op.bytespan() {
        break;
      }
      rollback -= row.op.bytespan();
    }
    offsets
  }

  /// The number of target bytes covered by the buffered operations.
  pub fn write_offset(&self) -> u64 {
    self.rows.last().map_or(0, |row| row.write_offset)
  }

  pub fn into_ops(self) -> impl Iterator<Item = Op> {
    self.rows.into_iter().map(|row| row.op)
  }
}
