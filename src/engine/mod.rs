//! engine
//!
//! Orchestrates the deployment: Ledger -> StepRunner -> BuildWaiter -> stages.
//!
//! # Architecture
//!
//! ```text
//! deploy_all / destroy_all
//!        |
//!        v
//!   StageExecutor  --- runs named steps through --->  StepRunner  <--> Ledger
//!        |
//!        +--> SourceControl (clone, checkout, commit, push)
//!        +--> Infra (local init / plan / apply / destroy, outputs)
//!        +--> BuildWaiter --> BuildService (blocks until the CI build ends)
//! ```
//!
//! Stages run strictly in order and the first failing step halts the run.
//! The ledger records which step failed and why, so the next invocation
//! resumes there: completed steps are skipped.
//!
//! # Invariants
//!
//! - A step is marked complete only after its work has finished
//! - Every failure is written to the ledger before it is returned
//! - Nothing is retried within one invocation
//!
//! # Example
//!
//! ```no_run
//! use foundation_deployer::builds::GcloudBuilds;
//! use foundation_deployer::core::config::Config;
//! use foundation_deployer::core::ledger::Ledger;
//! use foundation_deployer::engine::{deploy_all, Context, Services};
//! use foundation_deployer::engine::waiter::ThreadSleeper;
//! use foundation_deployer::gcloud::Gcloud;
//! use foundation_deployer::git::CsrGit;
//! use foundation_deployer::iac::Terraform;
//!
//! let config = Config::load("foundation.toml").unwrap();
//! let mut ledger = Ledger::load(".steps.json").unwrap();
//! let gcloud = Gcloud::new();
//! let git = CsrGit::new(gcloud.clone());
//! let infra = Terraform::new();
//! let builds = GcloudBuilds::new(gcloud.clone());
//! let services = Services {
//!     git: &git,
//!     infra: &infra,
//!     builds: &builds,
//!     access_policy: &gcloud,
//!     sleeper: &ThreadSleeper,
//! };
//!
//! deploy_all(&config, services, Context::default(), &mut ledger).unwrap();
//! ```

pub mod destroy;
pub mod pipeline;
pub mod runner;
pub mod stages;
pub mod waiter;

pub use destroy::destroy_all;
pub use pipeline::{LocalApply, StageExecutor, StageSpec};
pub use runner::{StepError, StepRunner};
pub use stages::{deploy_all, BootstrapOutputs, InfraPipelineOutputs};
pub use waiter::{BuildTarget, BuildWaiter, Sleeper, WaitError, WaitPolicy};

use thiserror::Error;

use crate::builds::BuildService;
use crate::core::files::FileError;
use crate::core::types::TypeError;
use crate::gcloud::{AccessPolicyLookup, GcloudError};
use crate::git::{GitError, SourceControl};
use crate::iac::{Infra, InfraError};
use crate::ui::output::Verbosity;
use crate::ui::prompts::PromptError;

/// Per-run settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    /// Output verbosity.
    pub verbosity: Verbosity,
    /// Skip the pause before handing over to CI.
    pub disable_prompt: bool,
}

/// The external collaborators a run talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub git: &'a dyn SourceControl,
    pub infra: &'a dyn Infra,
    pub builds: &'a dyn BuildService,
    pub access_policy: &'a dyn AccessPolicyLookup,
    pub sleeper: &'a dyn Sleeper,
}

/// Errors from running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step failed, or its outcome could not be recorded.
    #[error(transparent)]
    Step(#[from] StepError),

    /// A CI build failed or never finished.
    #[error(transparent)]
    Wait(#[from] WaitError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Gcloud(#[from] GcloudError),

    /// The operator closed input at the CI hand-over pause.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// A step or branch name could not be built.
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The organization has no access context manager policy.
    #[error("no access context manager policy found for organization {org_id}")]
    MissingAccessPolicy { org_id: String },
}
