//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--ledger <path>`: Ledger file (default `.steps.json`)
//! - `--debug`: Debug output and logging
//! - `--quiet` / `-q`: Errors only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::core::ledger::DEFAULT_LEDGER_FILE;
use crate::ui::output::Verbosity;

/// Resumable, stage-by-stage deployer for a multi-stage cloud foundation
#[derive(Parser, Debug)]
#[command(name = "foundation-deployer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Ledger file recording step progress
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_LEDGER_FILE)]
    pub ledger: PathBuf,

    /// Enable debug output and logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy the foundation, resuming from the ledger
    #[command(
        long_about = "Deploy the foundation stage by stage.\n\n\
            Every step is recorded in the ledger as it completes. If a step fails, \
            the failure is recorded and the run stops; running deploy again skips \
            completed steps and resumes at the failed one.",
        after_help = "\
EXAMPLES:
    # First run
    foundation-deployer deploy --config foundation.toml

    # Unattended run, no pause before handing over to CI
    foundation-deployer deploy --config foundation.toml --disable-prompt"
    )]
    Deploy {
        /// Deployment configuration (TOML)
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Do not pause before handing over to CI
        #[arg(long)]
        disable_prompt: bool,
    },

    /// Destroy the foundation in reverse stage order
    Destroy {
        /// Deployment configuration (TOML)
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },

    /// List completed steps
    Steps {
        /// Include failed steps with their errors
        #[arg(long)]
        all: bool,
    },

    /// Return one step to pending so the next run executes it again
    Reset {
        /// Step name, e.g. gcp-org.plan
        step: String,
    },

    /// Check a configuration file without deploying
    Validate {
        /// Deployment configuration (TOML)
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
    },

    /// Generate shell completion scripts
    #[command(
        after_help = "\
INSTALLATION:
    # Bash
    foundation-deployer completion bash > ~/.local/share/bash-completion/completions/foundation-deployer

    # Zsh
    foundation-deployer completion zsh > ~/.zfunc/_foundation-deployer

    # Fish
    foundation-deployer completion fish > ~/.config/fish/completions/foundation-deployer.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
