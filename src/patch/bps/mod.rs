//! The BPS delta-patch format.
//!
//! Documentation: https://github.com/blakesmith/rombp/blob/master/docs/bps_spec.md

mod opbuf;
mod ops;
pub mod varint;

mod apply;
mod diff;
mod optimize;
mod read;
mod validate;
mod write;

pub use self::apply::{apply, apply_with_header};
pub use self::diff::diff;
pub use self::opbuf::OpBuffer;
pub use self::optimize::optimize;
pub use self::ops::{Op, sequence_efficiency};
pub use self::read::read;
pub use self::validate::{Validator, check_stream};
pub use self::write::write;

pub const MAGIC: &[u8] = b"BPS1";

/// Two content CRC32s plus the whole-patch CRC32.
pub const FOOTER_LEN: usize = 3 * size_of::<u32>();

// Values used in patch-hunk encoding.
pub(crate) const OP_SOURCEREAD: u64 = 0b00;
pub(crate) const OP_TARGETREAD: u64 = 0b01;
pub(crate) const OP_SOURCECOPY: u64 = 0b10;
pub(crate) const OP_TARGETCOPY: u64 = 0b11;

pub(crate) const OPCODEMASK: u64 = 0b11;
pub(crate) const OPCODESHIFT: u32 = 2;
