use std::fmt;
use std::io;

pub mod bps;
pub mod ips;

pub use self::err::*;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Kind {
  IPS,
  BPS,
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Kind::IPS => write!(f, "IPS"),
      Kind::BPS => write!(f, "BPS"),
    }
  }
}

/// Identifies a patch by its magic bytes.
pub fn find_patch_kind(patch: &[u8]) -> Option<Kind> {
  if patch.starts_with(ips::MAGIC) {
    Some(Kind::IPS)
  } else if patch.starts_with(bps::MAGIC) {
    Some(Kind::BPS)
  } else {
    None
  }
}

mod err {
  use super::*;

  #[derive(Debug, thiserror::Error)]
  pub enum Error {
    #[error(transparent)]
    IO(io::Error),
    #[error("The patch file is corrupt.")]
    BadPatch,
    #[error("The patch or ROM file is too large.")]
    FileTooLarge,
    #[error("The patch is not meant for this file.")]
    WrongInputFile,
    #[error("This patch has already been applied to the input file.")]
    AlreadyPatched,
  }

  impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
      use io::ErrorKind::*;
      // These errors arise from violated expectations about the byte stream.
      match err.kind() {
        InvalidInput => Error::BadPatch,
        InvalidData => Error::BadPatch,
        UnexpectedEof => Error::BadPatch,
        WriteZero => Error::BadPatch,
        _ => Error::IO(err),
      }
    }
  }
}
