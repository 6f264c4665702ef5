//! iac::traits
//!
//! Infrastructure-as-code trait, run options and scoped credentials.
//!
//! # Credentials
//!
//! A local run either uses the ambient credentials of the operator or
//! impersonates a stage service account. The choice travels with each call
//! in [`InfraOptions`]; implementations apply it to the child process only,
//! so nothing has to be restored afterwards.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from infrastructure-as-code operations.
#[derive(Debug, Error)]
pub enum InfraError {
    /// The tool could not be started.
    #[error("failed to run '{binary}': {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully.
    #[error("'{command}' failed in {dir}: {stderr}")]
    CommandFailed {
        command: String,
        dir: PathBuf,
        stderr: String,
    },

    /// A requested output does not exist or has an unexpected shape.
    #[error("output '{name}' of {dir}: {message}")]
    Output {
        name: String,
        dir: PathBuf,
        message: String,
    },

    /// An output map lacks a required key.
    #[error("output '{name}' has no key '{key}'")]
    MissingKey { name: String, key: String },

    /// A service account identity is malformed.
    #[error("invalid service account '{0}'")]
    InvalidServiceAccount(String),
}

/// A service account e-mail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAccount(String);

impl ServiceAccount {
    pub fn new(email: impl Into<String>) -> Result<Self, InfraError> {
        let email = email.into();
        let valid = email
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'));
        if !valid {
            return Err(InfraError::InvalidServiceAccount(email));
        }
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credentials for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Credential {
    /// Whatever the operator's environment provides.
    #[default]
    Ambient,
    /// Impersonate a service account for this run only.
    Impersonate(ServiceAccount),
}

/// Options for one run against a configuration directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraOptions {
    pub dir: PathBuf,
    pub credential: Credential,
    /// Migrate existing state to a newly configured backend during `init`.
    pub migrate_state: bool,
}

impl InfraOptions {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            credential: Credential::Ambient,
            migrate_state: false,
        }
    }

    pub fn impersonating(mut self, account: ServiceAccount) -> Self {
        self.credential = Credential::Impersonate(account);
        self
    }

    pub fn with_migrate_state(mut self) -> Self {
        self.migrate_state = true;
        self
    }
}

/// The infrastructure-as-code tool.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
pub trait Infra: Send + Sync {
    fn init(&self, opts: &InfraOptions) -> Result<(), InfraError>;

    /// Compute a plan and return its human readable diff.
    fn plan(&self, opts: &InfraOptions) -> Result<String, InfraError>;

    fn apply(&self, opts: &InfraOptions) -> Result<(), InfraError>;

    fn destroy(&self, opts: &InfraOptions) -> Result<(), InfraError>;

    /// A string output of the configuration in `dir`.
    fn output(&self, dir: &Path, name: &str) -> Result<String, InfraError>;

    /// A map output of the configuration in `dir`.
    fn output_map(&self, dir: &Path, name: &str) -> Result<BTreeMap<String, String>, InfraError>;
}

/// Look up `key` in an output map.
pub fn map_value(
    map: &BTreeMap<String, String>,
    name: &str,
    key: &str,
) -> Result<String, InfraError> {
    map.get(key).cloned().ok_or_else(|| InfraError::MissingKey {
        name: name.to_string(),
        key: key.to_string(),
    })
}
