//! iac::terraform
//!
//! [`Infra`] implementation running the `terraform` binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info};

use super::traits::{Credential, Infra, InfraError, InfraOptions};

/// Environment variable the Google provider reads for impersonation.
pub const IMPERSONATE_ENV: &str = "GOOGLE_IMPERSONATE_SERVICE_ACCOUNT";

/// Runs `terraform` with `-no-color -input=false`.
#[derive(Debug, Clone)]
pub struct Terraform {
    binary: PathBuf,
}

impl Default for Terraform {
    fn default() -> Self {
        Self::new()
    }
}

impl Terraform {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("terraform"),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, dir: &Path, credential: &Credential, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).current_dir(dir);
        if let Credential::Impersonate(account) = credential {
            cmd.env(IMPERSONATE_ENV, account.as_str());
        }
        cmd
    }

    fn run(&self, dir: &Path, credential: &Credential, args: &[&str]) -> Result<String, InfraError> {
        let command = format!("terraform {}", args.join(" "));
        info!(dir = %dir.display(), command = %command, "running terraform");

        let output = self
            .command(dir, credential, args)
            .output()
            .map_err(|source| InfraError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(dir = %dir.display(), "{}", stdout);

        if !output.status.success() {
            return Err(InfraError::CommandFailed {
                command,
                dir: dir.to_path_buf(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(stdout)
    }

    fn output_json(&self, dir: &Path, name: &str) -> Result<serde_json::Value, InfraError> {
        let stdout = self.run(
            dir,
            &Credential::Ambient,
            &["output", "-no-color", "-json", name],
        )?;
        serde_json::from_str(&stdout).map_err(|e| InfraError::Output {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            message: e.to_string(),
        })
    }
}

fn init_args(migrate_state: bool) -> Vec<&'static str> {
    let mut args = vec!["init", "-no-color", "-input=false"];
    if migrate_state {
        args.extend(["-migrate-state", "-force-copy"]);
    }
    args
}

/// Render an output value as the string Terraform would print.
fn scalar(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_map(
    value: serde_json::Value,
    name: &str,
    dir: &Path,
) -> Result<BTreeMap<String, String>, InfraError> {
    match value {
        serde_json::Value::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), scalar(v))).collect()),
        other => Err(InfraError::Output {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            message: format!("expected a map, got {}", other),
        }),
    }
}

impl Infra for Terraform {
    fn init(&self, opts: &InfraOptions) -> Result<(), InfraError> {
        self.run(&opts.dir, &opts.credential, &init_args(opts.migrate_state))
            .map(|_| ())
    }

    fn plan(&self, opts: &InfraOptions) -> Result<String, InfraError> {
        self.run(&opts.dir, &opts.credential, &["plan", "-no-color", "-input=false"])
    }

    fn apply(&self, opts: &InfraOptions) -> Result<(), InfraError> {
        self.run(
            &opts.dir,
            &opts.credential,
            &["apply", "-no-color", "-input=false", "-auto-approve"],
        )
        .map(|_| ())
    }

    fn destroy(&self, opts: &InfraOptions) -> Result<(), InfraError> {
        self.run(
            &opts.dir,
            &opts.credential,
            &["destroy", "-no-color", "-input=false", "-auto-approve"],
        )
        .map(|_| ())
    }

    fn output(&self, dir: &Path, name: &str) -> Result<String, InfraError> {
        Ok(scalar(&self.output_json(dir, name)?))
    }

    fn output_map(&self, dir: &Path, name: &str) -> Result<BTreeMap<String, String>, InfraError> {
        as_map(self.output_json(dir, name)?, name, dir)
    }
}
