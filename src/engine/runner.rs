//! engine::runner
//!
//! Runs units of work against the ledger.
//!
//! # Architecture
//!
//! ```text
//! complete in ledger? -- yes --> skip
//!        |
//!        no
//!        v
//!      work() -- ok --> ledger.complete(name)
//!        |
//!       err --> ledger.fail(name, message) --> return failure
//! ```
//!
//! The ledger is written before the result is returned, so the persisted
//! state and the caller's view always agree. Nothing is retried here;
//! retrying means running the pipeline again, which skips completed steps.
//!
//! Work receives the ledger, so a step can run nested steps of its own.
//!
//! # Example
//!
//! ```
//! use foundation_deployer::core::ledger::Ledger;
//! use foundation_deployer::core::types::StepName;
//! use foundation_deployer::engine::runner::{StepError, StepRunner};
//! use foundation_deployer::ui::output::Verbosity;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let mut ledger = Ledger::load(dir.path().join(".steps.json")).unwrap();
//! let runner = StepRunner::new(Verbosity::Quiet);
//! let step = StepName::new("gcp-org.copy-code").unwrap();
//!
//! runner.run(&mut ledger, &step, |_| Ok::<(), StepError>(())).unwrap();
//! assert!(ledger.is_complete(&step));
//! ```

use std::error::Error as StdError;

use thiserror::Error;
use tracing::{info, warn};

use crate::core::ledger::{Ledger, LedgerError};
use crate::core::types::StepName;
use crate::engine::PipelineError;
use crate::ui::output::{self, Verbosity};

/// Boxed error returned by a unit of work.
pub type WorkError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors from running a step.
#[derive(Debug, Error)]
pub enum StepError {
    /// The work failed; the failure is recorded in the ledger.
    #[error("step '{step}' failed: {message}")]
    Failed {
        /// The step that failed
        step: StepName,
        /// The message recorded in the ledger
        message: String,
        #[source]
        source: WorkError,
    },

    /// Recording the outcome failed. The run cannot continue.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl StepError {
    /// The innermost step that failed, for nested steps.
    pub fn failed_step(&self) -> Option<&StepName> {
        match self {
            StepError::Failed { step, source, .. } => match nested(source) {
                Some(inner) => inner.failed_step().or(Some(step)),
                None => Some(step),
            },
            StepError::Ledger(_) => None,
        }
    }
}

fn nested(source: &WorkError) -> Option<&StepError> {
    if let Some(inner) = source.downcast_ref::<StepError>() {
        return Some(inner);
    }
    match source.downcast_ref::<PipelineError>() {
        Some(PipelineError::Step(inner)) => Some(inner),
        _ => None,
    }
}

/// A ledger write failure from a nested step, which must stay fatal
/// instead of being recorded as the enclosing step's failure.
fn nested_ledger_error(source: WorkError) -> Result<LedgerError, WorkError> {
    let source = match source.downcast::<StepError>() {
        Ok(step) => {
            return match *step {
                StepError::Ledger(err) => Ok(err),
                other => Err(Box::new(other)),
            }
        }
        Err(source) => source,
    };
    match source.downcast::<PipelineError>() {
        Ok(pipeline) => match *pipeline {
            PipelineError::Step(StepError::Ledger(err)) => Ok(err),
            other => Err(Box::new(other)),
        },
        Err(source) => Err(source),
    }
}

/// Runs steps at most once across process restarts.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepRunner {
    verbosity: Verbosity,
}

impl StepRunner {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Run `work` as step `name` unless the ledger already marks it complete.
    ///
    /// # Errors
    ///
    /// - [`StepError::Failed`] if `work` fails (after recording it)
    /// - [`StepError::Ledger`] if this or a nested outcome cannot be persisted
    pub fn run<F, E>(&self, ledger: &mut Ledger, name: &StepName, work: F) -> Result<(), StepError>
    where
        F: FnOnce(&mut Ledger) -> Result<(), E>,
        E: Into<WorkError>,
    {
        if ledger.is_complete(name) {
            info!(step = %name, "skipping completed step");
            output::print(format!("skipping step {}", name), self.verbosity);
            return Ok(());
        }

        info!(step = %name, "starting step");
        output::print(format!("starting step {}", name), self.verbosity);

        match work(ledger) {
            Ok(()) => {
                ledger.complete(name)?;
                output::print(format!("completing step {}", name), self.verbosity);
                Ok(())
            }
            Err(err) => {
                let source = match nested_ledger_error(err.into()) {
                    Ok(ledger_err) => return Err(StepError::Ledger(ledger_err)),
                    Err(source) => source,
                };
                let message = source.to_string();
                warn!(step = %name, error = %message, "step failed");
                output::print(format!("failing step {}", name), self.verbosity);
                ledger.fail(name, &message)?;
                Err(StepError::Failed {
                    step: name.clone(),
                    message,
                    source,
                })
            }
        }
    }
}
