use fs_err as fs;
use miette::Diagnostic;
use rompatch::patch::{self, Kind, bps, find_patch_kind, ips};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Clone, Debug, clap::Args)]
pub struct Args {
  #[arg(short, long)]
  pub patch: PathBuf,
}

impl Args {
  pub fn call(self) -> Result<(), Error> {
    let patch_bytes = fs::read(&self.patch)?;
    let kind = find_patch_kind(&patch_bytes).ok_or(Error::UnknownPatchKind)?;
    println!("format: {kind}");

    match kind {
      Kind::BPS => {
        let ops = bps::read(&patch_bytes)?;
        bps::check_stream(&ops)?;
        for op in &ops {
          match op {
            bps::Op::Header { source_size, target_size, metadata } => {
              println!("source size: {source_size}");
              println!("target size: {target_size}");
              if !metadata.is_empty() {
                println!("metadata: {metadata}");
              }
            }
            bps::Op::SourceCrc32(crc) => println!("source crc32: {:08X}", crc.value()),
            bps::Op::TargetCrc32(crc) => println!("target crc32: {:08X}", crc.value()),
            _ => {}
          }
        }
        println!("operations: {}", ops.len() - 3);
      }
      Kind::IPS => {
        let patch = ips::Patch::read(&patch_bytes)?;
        let patched_bytes: usize = patch.records().values().map(Vec::len).sum();
        println!("records: {}", patch.records().len());
        println!("patched bytes: {patched_bytes}");
        match std::str::from_utf8(patch.trailer()) {
          Ok(trailer) if !trailer.is_empty() => println!("trailer: {trailer}"),
          Ok(_) => {}
          Err(_) => println!("trailer: {} bytes (not UTF-8)", patch.trailer().len()),
        }
      }
    }
    Ok(())
  }
}

#[non_exhaustive]
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
  #[error(transparent)]
  IO(#[from] io::Error),
  #[error(transparent)]
  Patching(#[from] patch::Error),
  #[error("Unknown patch format.")]
  UnknownPatchKind,
}
