//! engine::waiter
//!
//! Blocks until a CI build triggered by a push reaches a terminal status.
//!
//! # Architecture
//!
//! ```text
//!            sleep(initial_delay)
//!                    |
//!                    v
//!   +---------> Searching --- running build found ---> Polling --+
//!   |  nothing      |                                     ^      | non-terminal:
//!   +--listed-------+                                     +------+ sleep(interval)
//!                   | only finished builds                       |
//!                   v                                            v terminal
//!                Terminal <--------------------------------------+
//! ```
//!
//! Searching and polling each have their own attempt counter capped at
//! `max_attempts`. Running out of either is a timeout, reported separately
//! from a failed build.
//!
//! All waiting goes through a [`Sleeper`], so tests run without real time
//! passing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::builds::{
    self, BuildFilter, BuildQuery, BuildRecord, BuildService, BuildServiceError, BuildStatus,
};
use crate::core::config::Config;

/// Errors from waiting on a build.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The build finished with a status other than `SUCCESS`.
    #[error("{message}\nSee:\n{url}\nfor details.")]
    BuildFailed {
        build_id: String,
        status: BuildStatus,
        /// Console page of the build
        url: String,
        /// What the build was for
        message: String,
    },

    /// No build was found, or it did not finish, within the attempt ceiling.
    #[error(
        "timed out after {attempts} attempts waiting for build {}",
        .build_id.as_deref().unwrap_or("(none found)")
    )]
    Timeout {
        attempts: u32,
        build_id: Option<String>,
    },

    /// The build service could not be queried.
    #[error(transparent)]
    Service(#[from] BuildServiceError),
}

/// Waiting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Wait before the first search, giving the trigger time to fire.
    pub initial_delay: Duration,
    /// Wait between consecutive queries.
    pub interval: Duration,
    /// Ceiling for searches, and separately for polls.
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(20),
            interval: Duration::from_secs(20),
            max_attempts: 40,
        }
    }
}

impl WaitPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_delay: config.initial_delay(),
            interval: config.poll_interval(),
            max_attempts: config.max_build_retries(),
        }
    }
}

/// Blocking pause between queries.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested sleeps without waiting.
///
/// Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSleeper {
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every requested sleep, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(duration);
    }
}

/// The builds to wait on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    /// CI project
    pub project: String,
    pub region: String,
    pub filter: BuildFilter,
}

impl BuildTarget {
    pub fn new(project: impl Into<String>, region: impl Into<String>, filter: BuildFilter) -> Self {
        Self {
            project: project.into(),
            region: region.into(),
            filter,
        }
    }
}

enum State {
    Searching { attempts: u32 },
    Polling { build_id: String, attempts: u32 },
    Terminal(BuildRecord),
}

/// Waits for builds through a [`BuildService`].
pub struct BuildWaiter<'a> {
    service: &'a dyn BuildService,
    sleeper: &'a dyn Sleeper,
    policy: WaitPolicy,
}

impl<'a> BuildWaiter<'a> {
    pub fn new(service: &'a dyn BuildService, sleeper: &'a dyn Sleeper, policy: WaitPolicy) -> Self {
        Self {
            service,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> WaitPolicy {
        self.policy
    }

    /// Wait for the newest build matching `target` to finish.
    ///
    /// `failure_message` prefixes the error if the build does not succeed.
    ///
    /// # Errors
    ///
    /// - [`WaitError::BuildFailed`] if the build finished unsuccessfully
    /// - [`WaitError::Timeout`] if the attempt ceiling was reached
    /// - [`WaitError::Service`] if a query failed
    pub fn wait(&self, target: &BuildTarget, failure_message: &str) -> Result<BuildRecord, WaitError> {
        info!(filter = %target.filter, "waiting for build");
        self.sleeper.sleep(self.policy.initial_delay);

        let mut state = State::Searching { attempts: 0 };
        loop {
            state = match state {
                State::Searching { attempts } => self.search(target, attempts)?,
                State::Polling { build_id, attempts } => self.poll(target, build_id, attempts)?,
                State::Terminal(build) => return self.finish(target, build, failure_message),
            };
        }
    }

    fn search(&self, target: &BuildTarget, attempts: u32) -> Result<State, WaitError> {
        if attempts >= self.policy.max_attempts {
            warn!(filter = %target.filter, attempts, "no build found");
            return Err(WaitError::Timeout {
                attempts,
                build_id: None,
            });
        }
        if attempts > 0 {
            self.sleeper.sleep(self.policy.interval);
        }

        let query = BuildQuery {
            project: target.project.clone(),
            region: target.region.clone(),
            filter: target.filter.clone(),
            limit: None,
        };
        let builds = self.service.list_builds(&query)?;

        if let Some(running) = builds.iter().find(|b| !b.status.is_terminal()) {
            debug!(build_id = %running.id, status = %running.status, "found running build");
            return Ok(State::Polling {
                build_id: running.id.clone(),
                attempts: 0,
            });
        }

        // Listings are newest first: the head is the latest finished build.
        match builds.into_iter().next() {
            Some(finished) => {
                debug!(build_id = %finished.id, status = %finished.status, "build already finished");
                Ok(State::Terminal(finished))
            }
            None => Ok(State::Searching {
                attempts: attempts + 1,
            }),
        }
    }

    fn poll(&self, target: &BuildTarget, build_id: String, attempts: u32) -> Result<State, WaitError> {
        let build = self
            .service
            .describe_build(&target.project, &target.region, &build_id)?;
        let attempts = attempts + 1;

        if build.status.is_terminal() {
            return Ok(State::Terminal(build));
        }

        debug!(build_id = %build_id, status = %build.status, attempts, "build still running");
        if attempts >= self.policy.max_attempts {
            warn!(build_id = %build_id, attempts, "build did not finish");
            return Err(WaitError::Timeout {
                attempts,
                build_id: Some(build_id),
            });
        }

        self.sleeper.sleep(self.policy.interval);
        Ok(State::Polling { build_id, attempts })
    }

    fn finish(
        &self,
        target: &BuildTarget,
        build: BuildRecord,
        failure_message: &str,
    ) -> Result<BuildRecord, WaitError> {
        if build.status.is_success() {
            info!(build_id = %build.id, "build succeeded");
            return Ok(build);
        }

        warn!(build_id = %build.id, status = %build.status, "build failed");
        Err(WaitError::BuildFailed {
            url: builds::build_url(&target.project, &target.region, &build.id),
            build_id: build.id,
            status: build.status,
            message: failure_message.to_string(),
        })
    }
}
