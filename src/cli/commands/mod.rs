//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads what it needs (configuration, ledger)
//! 2. Calls the engine or the ledger
//! 3. Formats and displays output
//!
//! Handlers return `anyhow` errors with context; the typed root cause is
//! kept in the chain so [`crate::cli::exit_code`] can classify it.

mod completion;
mod deploy;
mod steps;
mod validate;

pub use completion::completion;
pub use deploy::{deploy, destroy};
pub use steps::{reset, steps};
pub use validate::validate;

use crate::cli::args::Command;
use crate::cli::Options;
use anyhow::Result;

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, opts: &Options) -> Result<()> {
    match command {
        Command::Deploy {
            config,
            disable_prompt,
        } => deploy::deploy(opts, &config, disable_prompt),
        Command::Destroy { config } => deploy::destroy(opts, &config),
        Command::Steps { all } => steps::steps(opts, all),
        Command::Reset { step } => steps::reset(opts, &step),
        Command::Validate { config } => validate::validate(opts, &config),
        Command::Completion { shell } => completion::completion(shell),
    }
}
