//! Foundation Deployer - resumable, stage-by-stage deployment of a cloud foundation
//!
//! The deployer walks a fixed sequence of infrastructure stages (bootstrap,
//! organization, environments, networks, projects, application
//! infrastructure). Each stage is staged into a source repository, planned
//! and applied by pushing branches that trigger CI builds, and awaited by
//! polling the build service.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - Step runner, build waiter and the deploy / destroy pipelines
//! - [`core`] - Domain types, the execution ledger, configuration, file helpers
//! - [`builds`] - CI build service abstraction (Cloud Build)
//! - [`git`] - Source control abstraction (Cloud Source Repositories)
//! - [`iac`] - Infrastructure-as-code abstraction (Terraform)
//! - [`gcloud`] - Shared runner for the `gcloud` binary
//! - [`logging`] - Diagnostic tracing setup
//! - [`ui`] - Operator facing output and prompts
//!
//! # Correctness Invariants
//!
//! 1. A step is recorded complete only after its work has finished
//! 2. Completed steps never run again unless explicitly reset
//! 3. Every failure is persisted in the ledger before the run stops
//! 4. Build waits are bounded by the configured retry ceiling

pub mod builds;
pub mod cli;
pub mod core;
pub mod engine;
pub mod gcloud;
pub mod git;
pub mod iac;
pub mod logging;
pub mod ui;
