use fs_err as fs;
use miette::Diagnostic;
use rompatch::patch::{self, bps, ips};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use ulid::Ulid;

#[derive(Clone, Debug, clap::Args)]
pub struct Args {
  /// The clean ROM the patch will be applied to.
  #[arg(short, long)]
  pub source: PathBuf,
  /// The modified ROM the patch should reproduce.
  #[arg(short, long)]
  pub target: PathBuf,
  #[arg(short, long)]
  pub output: PathBuf,
  #[arg(short, long, value_enum, default_value_t = Format::Bps)]
  pub format: Format,
  /// Free-form patch metadata, stored verbatim.
  #[arg(short, long)]
  pub metadata: Option<String>,
  /// Window size for the delta search. Bigger is faster but coarser.
  #[arg(short, long, default_value_t = 64)]
  pub blocksize: usize,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum Format {
  Bps,
  Ips,
}

impl Args {
  pub fn call(self) -> Result<(), Error> {
    let source = fs::read(&self.source)?;
    let target = fs::read(&self.target)?;

    let patch_bytes = match self.format {
      Format::Bps => {
        let metadata = self.metadata.as_deref().unwrap_or("");
        let ops = bps::diff(self.blocksize.max(1), &source, &target, metadata);
        bps::write(&ops)?
      }
      Format::Ips => {
        let mut patch = ips::Patch::diff(&source, &target)?;
        if let Some(metadata) = self.metadata {
          patch.set_trailer(metadata.into_bytes());
        }
        patch.write()
      }
    };

    write_replacing(&self.output, &patch_bytes)?;
    log::info!(
      "Created a {} byte patch from {} target bytes: {:?}",
      patch_bytes.len(),
      target.len(),
      self.output
    );
    Ok(())
  }
}

/// Writes through a temp file in the destination directory, then renames it
/// into place, so an interrupted run can't leave a half-written file behind.
pub fn write_replacing(path: &Path, bytes: &[u8]) -> Result<(), io::Error> {
  let temp_path = path.with_file_name(format!("{}.tmp", Ulid::new()));
  fs::write(&temp_path, bytes)?;
  if let Err(err) = fs::rename(&temp_path, path) {
    let _ = fs::remove_file(&temp_path);
    return Err(err);
  }
  Ok(())
}

#[non_exhaustive]
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
  #[error(transparent)]
  IO(#[from] io::Error),
  #[error(transparent)]
  Patching(#[from] patch::Error),
}
