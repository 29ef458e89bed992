use miette::Diagnostic;
use thiserror::Error;

mod apply;
mod cli;
mod create;
mod info;
mod log;

fn main() -> miette::Result<()> {
  use cli::CommandKind::*;

  log::init();
  let args: cli::Args = clap::Parser::try_parse().map_err(Error::from)?;
  match args.command {
    Apply(args) => args.call().map_err(|err| Error::from(err).into()),
    Create(args) => args.call().map_err(|err| Error::from(err).into()),
    Info(args) => args.call().map_err(|err| Error::from(err).into()),
  }
}

#[non_exhaustive]
#[derive(Debug, Error, Diagnostic)]
enum Error {
  #[error(transparent)]
  CliError(#[from] clap::error::Error),
  #[error(transparent)]
  #[diagnostic(transparent)]
  ApplyPatchError(#[from] apply::Error),
  #[error(transparent)]
  #[diagnostic(transparent)]
  CreatePatchError(#[from] create::Error),
  #[error(transparent)]
  #[diagnostic(transparent)]
  InfoError(#[from] info::Error),
}
