//! core::ledger
//!
//! The execution ledger: durable record of which steps completed or failed.
//!
//! # Crash Safety Contract
//!
//! 1. **Per-mutation persistence:** [`Ledger::complete`], [`Ledger::fail`] and
//!    [`Ledger::reset`] write the whole ledger to disk (temp file, fsync,
//!    rename) before returning. There is no buffering.
//! 2. **Recoverability:** after a crash, [`Ledger::load`] returns the ledger as
//!    it was after the last mutation that returned `Ok`.
//! 3. **Fatal writes:** a persistence failure is returned to the caller and
//!    must stop the run. The ledger is the only source of truth for resuming.
//!
//! # Concurrency
//!
//! The ledger is owned by exactly one deployer process for the duration of
//! a run. There is no file locking: two processes running against the same
//! ledger file is unsupported and can lose updates.
//!
//! # Storage
//!
//! ```json
//! {
//!   "file": ".steps.json",
//!   "steps": {
//!     "gcp-org.plan": { "name": "gcp-org.plan", "status": "COMPLETE", "error": "" }
//!   }
//! }
//! ```
//!
//! A step absent from `steps` is pending. Unknown fields are ignored on
//! read so older and newer deployers can share a file.
//!
//! # Example
//!
//! ```no_run
//! use foundation_deployer::core::ledger::Ledger;
//! use foundation_deployer::core::types::StepName;
//!
//! let mut ledger = Ledger::load(".steps.json")?;
//! let step = StepName::new("gcp-bootstrap.copy-code")?;
//! if !ledger.is_complete(&step) {
//!     ledger.complete(&step)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{StepName, UtcTimestamp};

/// Default ledger file, relative to the working directory.
pub const DEFAULT_LEDGER_FILE: &str = ".steps.json";

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The ledger file exists but cannot be parsed.
    #[error("ledger file '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Reading or writing the ledger file failed.
    #[error("ledger i/o error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serializing the ledger failed.
    #[error("failed to serialize ledger: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Recorded status of a step.
///
/// Pending is not stored; it is the absence of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Complete,
    Error,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Complete => f.write_str("COMPLETE"),
            StepStatus::Error => f.write_str("ERROR"),
        }
    }
}

/// A single ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: StepName,
    pub status: StepStatus,
    /// Failure detail; empty unless `status` is `Error`.
    #[serde(default)]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<UtcTimestamp>,
}

/// On-disk shape. `steps` may be `null` in files written by older tools.
#[derive(Deserialize)]
struct LedgerFile {
    #[serde(default)]
    steps: Option<BTreeMap<StepName, StepRecord>>,
}

#[derive(Serialize)]
struct LedgerFileRef<'a> {
    file: &'a Path,
    steps: &'a BTreeMap<StepName, StepRecord>,
}

/// The execution ledger bound to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    file: PathBuf,
    steps: BTreeMap<StepName, StepRecord>,
}

impl Ledger {
    /// Load the ledger at `path`.
    ///
    /// A missing file is a fresh start and yields an empty ledger bound to
    /// `path`; nothing is written until the first mutation.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Corrupt`] if the file exists but is not a ledger
    /// - [`LedgerError::Io`] if the file exists but cannot be read
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::info!(path = %path.display(), "starting new ledger");
            return Ok(Self::empty(path));
        }

        let content = fs::read_to_string(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: LedgerFile =
            serde_json::from_str(&content).map_err(|source| LedgerError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        let steps = parsed.steps.unwrap_or_default();
        tracing::debug!(path = %path.display(), steps = steps.len(), "loaded ledger");

        // The bound path always wins over whatever "file" says on disk.
        Ok(Self {
            file: path.to_path_buf(),
            steps,
        })
    }

    /// An empty ledger bound to `path`.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            file: path.into(),
            steps: BTreeMap::new(),
        }
    }

    /// The file this ledger persists to.
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// True iff the step is recorded as complete.
    pub fn is_complete(&self, name: &StepName) -> bool {
        self.status(name) == Some(StepStatus::Complete)
    }

    /// Recorded status, or `None` if the step is pending.
    pub fn status(&self, name: &StepName) -> Option<StepStatus> {
        self.steps.get(name).map(|r| r.status)
    }

    /// The full record for a step, if any.
    pub fn record(&self, name: &StepName) -> Option<&StepRecord> {
        self.steps.get(name)
    }

    /// Last recorded failure detail, or `""`.
    pub fn error(&self, name: &StepName) -> &str {
        self.steps.get(name).map(|r| r.error.as_str()).unwrap_or("")
    }

    /// Mark a step complete and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written; the run must stop.
    pub fn complete(&mut self, name: &StepName) -> Result<(), LedgerError> {
        self.set(name, StepStatus::Complete, String::new())
    }

    /// Mark a step failed with `detail` and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be written; the run must stop.
    pub fn fail(&mut self, name: &StepName, detail: impl Into<String>) -> Result<(), LedgerError> {
        self.set(name, StepStatus::Error, detail.into())
    }

    /// Return a step to pending and persist.
    ///
    /// Returns `true` if the step had a record.
    pub fn reset(&mut self, name: &StepName) -> Result<bool, LedgerError> {
        let existed = self.steps.remove(name).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    /// Recorded steps in name order.
    pub fn list(&self) -> impl Iterator<Item = (&StepName, StepStatus)> + '_ {
        self.steps.iter().map(|(name, record)| (name, record.status))
    }

    /// Completed steps in name order.
    pub fn completed(&self) -> impl Iterator<Item = &StepName> + '_ {
        self.list()
            .filter(|(_, status)| *status == StepStatus::Complete)
            .map(|(name, _)| name)
    }

    /// Number of recorded steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True if no step has been recorded.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn set(&mut self, name: &StepName, status: StepStatus, error: String) -> Result<(), LedgerError> {
        self.steps.insert(
            name.clone(),
            StepRecord {
                name: name.clone(),
                status,
                error,
                updated_at: Some(UtcTimestamp::now()),
            },
        );
        self.save()
    }

    /// Write the ledger to disk with fsync.
    ///
    /// Writes a sibling temp file and renames it over the ledger so a crash
    /// mid-write never leaves a truncated file behind.
    pub fn save(&self) -> Result<(), LedgerError> {
        let io_err = |source| LedgerError::Io {
            path: self.file.clone(),
            source,
        };

        if let Some(parent) = self.file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let content = serde_json::to_string_pretty(&LedgerFileRef {
            file: &self.file,
            steps: &self.steps,
        })
        .map_err(LedgerError::Serialize)?;

        let temp_path = temp_path_for(&self.file);
        let mut file = File::create(&temp_path).map_err(io_err)?;
        file.write_all(content.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&temp_path, &self.file).map_err(io_err)?;

        tracing::debug!(path = %self.file.display(), steps = self.steps.len(), "ledger saved");
        Ok(())
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}
