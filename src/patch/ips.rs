//! The legacy IPS patch format.
//!
//! Documentation: https://zerosoft.zophar.net/ips.php

use crate::patch::Error::{self, BadPatch, FileTooLarge, WrongInputFile};
use byteorder::{BE, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::prelude::*;

pub const MAGIC: &[u8] = b"PATCH";

const EOF_MARKER: &[u8] = b"EOF";

/// The record offset that would collide with the end-of-records marker.
const EOF_OFFSET: u32 = u32::from_be_bytes([0, b'E', b'O', b'F']);

/// The largest payload a single record can carry.
const MAX_RECORD_LEN: usize = 0xFFFF;

/// An IPS patch: a mapping from absolute offsets to replacement bytes, plus
/// whatever opaque bytes followed the end-of-records marker.
///
/// The trailer is not part of the IPS format proper; some patch dialects
/// store a metadata document there. It is preserved byte for byte and never
/// interpreted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Patch {
  records: BTreeMap<u32, Vec<u8>>,
  trailer: Vec<u8>,
}

impl Patch {
  /// Parses IPS patch bytes, expanding run-length records.
  pub fn read(patch: &[u8]) -> Result<Self, Error> {
    let mut patch = patch;
    let mut magic = [0u8; 5];
    patch.read_exact(&mut magic)?;
    if magic != MAGIC {
      return Err(BadPatch);
    }

    let mut records = BTreeMap::new();
    loop {
      if patch.starts_with(EOF_MARKER) {
        patch = &patch[EOF_MARKER.len()..];
        break;
      }
      let offset: u32 = patch.read_u24::<BE>()?;
      let size: u16 = patch.read_u16::<BE>()?;
      let payload = if size == 0 {
        // A run-length record: two more bytes of length, one byte repeated.
        let run_len = patch.read_u16::<BE>()?;
        if run_len == 0 {
          return Err(BadPatch);
        }
        let value = patch.read_u8()?;
        vec![value; run_len.into()]
      } else {
        let mut payload = vec![0u8; size.into()];
        patch.read_exact(&mut payload)?;
        payload
      };
      records.insert(offset, payload);
    }

    Ok(Self { records, trailer: patch.to_vec() })
  }

  /// Builds a patch from the positions where `target` differs from `source`.
  ///
  /// Each maximal differing run becomes one record, split when it outgrows
  /// the 16-bit record size. A record is never allowed to start at the
  /// offset that spells the end-of-records marker; it starts one byte early
  /// instead, carrying one byte the files agree on.
  pub fn diff(source: &[u8], target: &[u8]) -> Result<Self, Error> {
    let mut records: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    let mut run_start: Option<usize> = None;

    for (i, &byte) in target.iter().enumerate() {
      if source.get(i) == Some(&byte) {
        run_start = None;
        continue;
      }
      match run_start {
        Some(start) if i - start < MAX_RECORD_LEN => {
          // The run's record was inserted when the run opened.
          records.get_mut(&(start as u32)).unwrap().push(byte);
        }
        _ => {
          let mut start = i;
          if start as u32 == EOF_OFFSET {
            start -= 1;
          }
          if start > 0xFF_FFFF {
            return Err(FileTooLarge);
          }
          records.insert(start as u32, target[start..=i].to_vec());
          run_start = Some(start);
        }
      }
    }

    Ok(Self { records, trailer: Vec::new() })
  }

  /// Encodes the patch, records in ascending offset order, trailer last.
  pub fn write(&self) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    for (&offset, payload) in &self.records {
      for (i, chunk) in payload.chunks(MAX_RECORD_LEN).enumerate() {
        let offset = offset + (i * MAX_RECORD_LEN) as u32;
        out.extend_from_slice(&offset.to_be_bytes()[1..]);
        out.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
        out.extend_from_slice(chunk);
      }
    }
    out.extend_from_slice(EOF_MARKER);
    out.extend_from_slice(&self.trailer);
    out
  }

  /// Applies the records to `rom` in ascending offset order, writing each
  /// payload at its offset minus `snes_header`. The buffer grows, zero
  /// filled, when a record extends past its end.
  pub fn apply(&self, rom: &mut Vec<u8>, snes_header: u32) -> Result<(), Error> {
    for (&offset, payload) in &self.records {
      let start = offset.checked_sub(snes_header).ok_or(WrongInputFile)? as usize;
      let end = start + payload.len();
      if end > rom.len() {
        rom.resize(end, 0);
      }
      rom[start..end].copy_from_slice(payload);
    }
    Ok(())
  }

  pub fn records(&self) -> &BTreeMap<u32, Vec<u8>> {
    &self.records
  }

  pub fn trailer(&self) -> &[u8] {
    &self.trailer
  }

  pub fn set_trailer(&mut self, trailer: Vec<u8>) {
    self.trailer = trailer;
  }
}
