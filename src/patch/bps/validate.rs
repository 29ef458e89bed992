use crate::patch::Error::{self, BadPatch};
use crate::patch::bps::Op;

/// A stateful check that an operation sequence forms a well-formed patch.
///
/// Feed every operation through [`check`](Self::check) in order, then call
/// [`finish`](Self::finish). The reader → validator → writer chain is the
/// safe pipeline; the applier runs its stream through one of these too.
#[derive(Debug, Default)]
pub struct Validator {
  state: State,
  source_size: u64,
  target_size: u64,
  write_offset: u64,
}

#[derive(Debug, Default, PartialEq, Eq)]
enum State {
  #[default]
  ExpectHeader,
  Body,
  ExpectSourceCrc32,
  ExpectTargetCrc32,
  Done,
}

impl Validator {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn check(&mut self, op: &Op) -> Result<(), Error> {
    match self.state {
      State::ExpectHeader => {
        let Op::Header { source_size, target_size, .. } = op else {
          return Err(BadPatch);
        };
        self.source_size = *source_size;
        self.target_size = *target_size;
        self.state = if self.target_size == 0 { State::ExpectSourceCrc32 } else { State::Body };
        Ok(())
      }
      State::Body => self.check_body_op(op),
      State::ExpectSourceCrc32 => {
        if !matches!(op, Op::SourceCrc32(_)) {
          return Err(BadPatch);
        }
        self.state = State::ExpectTargetCrc32;
        Ok(())
      }
      State::ExpectTargetCrc32 => {
        if !matches!(op, Op::TargetCrc32(_)) {
          return Err(BadPatch);
        }
        self.state = State::Done;
        Ok(())
      }
      // Nothing may follow the target checksum.
      State::Done => Err(BadPatch),
    }
  }

  fn check_body_op(&mut self, op: &Op) -> Result<(), Error> {
    let bytespan = op.bytespan();
    match op {
      Op::SourceRead { .. } => {
        // Reads the source at the write offset, so the span must exist in
        // the source file as well as the target.
        if self.write_offset.checked_add(bytespan).is_none_or(|end| end > self.source_size) {
          return Err(BadPatch);
        }
      }
      Op::TargetRead { .. } => {}
      Op::SourceCopy { offset, .. } => {
        if offset.checked_add(bytespan).is_none_or(|end| end > self.source_size) {
          return Err(BadPatch);
        }
      }
      Op::TargetCopy { offset, .. } => {
        // May straddle the write frontier (that's how repeating runs are
        // encoded) but cannot start at or past it.
        if *offset >= self.write_offset {
          return Err(BadPatch);
        }
      }
      Op::Header { .. } | Op::SourceCrc32(_) | Op::TargetCrc32(_) => return Err(BadPatch),
    }

    // The wire format cannot express a zero-length hunk; a hand-built
    // stream carrying one is malformed.
    if bytespan == 0 {
      return Err(BadPatch);
    }

    self.write_offset = self.write_offset.checked_add(bytespan).ok_or(BadPatch)?;
    if self.write_offset > self.target_size {
      return Err(BadPatch);
    }
    if self.write_offset == self.target_size {
      self.state = State::ExpectSourceCrc32;
    }
    Ok(())
  }

  /// Confirms the sequence ended where a patch is allowed to end.
  pub fn finish(&self) -> Result<(), Error> {
    if self.state != State::Done {
      return Err(BadPatch);
    }
    Ok(())
  }
}

/// Validates a complete operation sequence.
pub fn check_stream(ops: &[Op]) -> Result<(), Error> {
  let mut validator = Validator::new();
  for op in ops {
    validator.check(op)?;
  }
  validator.finish()
}
