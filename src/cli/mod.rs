//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Initialise logging
//! - Delegate to command handlers
//! - Map failures to process exit codes
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | usage error or unexpected failure |
//! | 2 | configuration error |
//! | 3 | ledger could not be loaded or written |
//! | 4 | a stage failed |

pub mod args;
pub mod commands;

pub use args::{Cli, Command, Shell};

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::Parser;

use crate::core::config::ConfigError;
use crate::core::ledger::{Ledger, LedgerError};
use crate::engine::{PipelineError, StepError};
use crate::logging;
use crate::ui::output::{self, Verbosity};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_LEDGER: u8 = 3;
pub const EXIT_STAGE: u8 = 4;

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Options {
    pub ledger: PathBuf,
    pub verbosity: Verbosity,
}

impl Options {
    /// Load the ledger named by `--ledger`.
    pub fn load_ledger(&self) -> Result<Ledger> {
        Ledger::load(&self.ledger)
            .with_context(|| format!("Failed to load ledger {}", self.ledger.display()))
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version also arrive here.
            let code = if err.use_stderr() {
                EXIT_FAILURE
            } else {
                EXIT_SUCCESS
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    let opts = Options {
        ledger: cli.ledger.clone(),
        verbosity: cli.verbosity(),
    };
    logging::init(opts.verbosity);

    match commands::dispatch(cli.command, &opts) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(err) => {
            output::error(format!("{:#}", err));
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Classify a failure by the first typed error in its chain.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG;
        }
        if cause.downcast_ref::<LedgerError>().is_some() {
            return EXIT_LEDGER;
        }
        if let Some(step) = cause.downcast_ref::<StepError>() {
            return step_code(step);
        }
        if let Some(pipeline) = cause.downcast_ref::<PipelineError>() {
            return match pipeline {
                PipelineError::Step(step) => step_code(step),
                _ => EXIT_STAGE,
            };
        }
    }
    EXIT_FAILURE
}

fn step_code(err: &StepError) -> u8 {
    match err {
        StepError::Ledger(_) => EXIT_LEDGER,
        StepError::Failed { .. } => EXIT_STAGE,
    }
}
