use super::*;

pub mod init;
pub mod run;

pub use init::init;
pub use run::{run, RunOptions};

/// Available commands for the CLI
#[derive(Subcommand, Clone)]
pub enum Commands {
  /// Write a starter configuration file
  Init,

  /// Digest the papers of one or more dates
  Run(RunOptions),
}
