//! Codecs for the IPS and BPS ROM patch formats.
//!
//! The engine works on in-memory byte buffers and treats them as opaque:
//! ROM-specific concerns (copier headers, region fix-ups) belong to callers.

pub mod crc;
pub mod patch;
