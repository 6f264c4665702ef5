//! gcloud
//!
//! Thin runner for the `gcloud` command line tool.
//!
//! All Google Cloud reads go through [`Gcloud::run_json`], which appends
//! `--format json` and parses stdout with `serde_json`. Callers deserialize
//! the returned value into their own record types.

use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Errors from invoking `gcloud`.
#[derive(Debug, Error)]
pub enum GcloudError {
    /// The binary could not be started.
    #[error("failed to run '{binary}': {source}")]
    Spawn {
        binary: String,
        source: std::io::Error,
    },

    /// The command exited unsuccessfully.
    #[error("'gcloud {command}' failed: {stderr}")]
    Failed { command: String, stderr: String },

    /// The command printed something that is not the expected JSON.
    #[error("'gcloud {command}' returned invalid JSON: {source}")]
    Json {
        command: String,
        source: serde_json::Error,
    },
}

/// Runs `gcloud` subcommands.
#[derive(Debug, Clone)]
pub struct Gcloud {
    binary: PathBuf,
}

impl Default for Gcloud {
    fn default() -> Self {
        Self::new()
    }
}

impl Gcloud {
    /// Use `gcloud` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("gcloud"),
        }
    }

    /// Use a specific binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Run a command and return its trimmed stdout.
    pub fn run(&self, args: &[&str]) -> Result<String, GcloudError> {
        let command = args.join(" ");
        debug!(command = %command, "running gcloud");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|source| GcloudError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(GcloudError::Failed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Run a command with `--format json` and parse the result.
    pub fn run_json(&self, args: &[&str]) -> Result<serde_json::Value, GcloudError> {
        let mut full: Vec<&str> = args.to_vec();
        full.extend(["--format", "json"]);
        let stdout = self.run(&full)?;
        parse_json(&args.join(" "), &stdout)
    }
}

fn parse_json(command: &str, stdout: &str) -> Result<serde_json::Value, GcloudError> {
    if stdout.is_empty() {
        return Ok(serde_json::Value::Array(Vec::new()));
    }
    serde_json::from_str(stdout).map_err(|source| GcloudError::Json {
        command: command.to_string(),
        source,
    })
}

/// Looks up the organization's access context manager policy.
///
/// The organization stage only creates a policy when none exists yet, and
/// the networks stage needs the id of whichever policy is in place.
pub trait AccessPolicyLookup: Send + Sync {
    /// The policy id (the last segment of its resource name), if any.
    fn access_policy_id(&self, org_id: &str) -> Result<Option<String>, GcloudError>;
}

impl AccessPolicyLookup for Gcloud {
    fn access_policy_id(&self, org_id: &str) -> Result<Option<String>, GcloudError> {
        let filter = format!("parent:organizations/{}", org_id);
        let policies = self.run_json(&[
            "access-context-manager",
            "policies",
            "list",
            "--organization",
            org_id,
            "--filter",
            filter.as_str(),
        ])?;
        Ok(policy_id_from_listing(&policies))
    }
}

fn policy_id_from_listing(policies: &serde_json::Value) -> Option<String> {
    policies
        .as_array()?
        .first()?
        .get("name")?
        .as_str()?
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// A lookup with a fixed answer, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct FixedAccessPolicy(pub Option<String>);

impl AccessPolicyLookup for FixedAccessPolicy {
    fn access_policy_id(&self, _org_id: &str) -> Result<Option<String>, GcloudError> {
        Ok(self.0.clone())
    }
}
