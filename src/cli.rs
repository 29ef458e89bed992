use crate::{apply, create, info};

#[derive(Clone, Debug, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(subcommand)]
  pub command: CommandKind,
}

#[derive(Clone, Debug, clap::Subcommand)]
#[command(about)]
pub enum CommandKind {
  /// Apply an IPS or BPS patch to a ROM.
  Apply(apply::Args),
  /// Create a patch from a clean and a modified ROM.
  Create(create::Args),
  /// Show what a patch file declares about itself.
  Info(info::Args),
}
