//! iac::mock
//!
//! In-memory infrastructure tool for deterministic testing.
//!
//! Outputs are looked up by name. An output registered for a directory
//! suffix wins over one registered without. Failures target one operation
//! in directories ending with a given path suffix.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{Credential, Infra, InfraError, InfraOptions};

/// Mock infrastructure tool. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockInfra {
    inner: Arc<Mutex<MockInfraInner>>,
}

#[derive(Debug, Default)]
struct MockInfraInner {
    outputs: HashMap<String, String>,
    scoped: Vec<(PathBuf, String, String)>,
    maps: HashMap<String, BTreeMap<String, String>>,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Kind of run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfraOp {
    Init,
    Plan,
    Apply,
    Destroy,
}

/// A failure for one operation in directories ending with `dir_suffix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailOn {
    pub op: InfraOp,
    pub dir_suffix: PathBuf,
}

/// Recorded call for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Run {
        op: InfraOp,
        dir: PathBuf,
        credential: Credential,
        migrate_state: bool,
    },
    Output {
        dir: PathBuf,
        name: String,
    },
}

impl MockInfra {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockInfraInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_output(self, name: &str, value: &str) -> Self {
        self.lock()
            .outputs
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Output `name` of configurations in directories ending with `dir_suffix`.
    pub fn with_output_in(self, dir_suffix: impl Into<PathBuf>, name: &str, value: &str) -> Self {
        self.lock()
            .scoped
            .push((dir_suffix.into(), name.to_string(), value.to_string()));
        self
    }

    pub fn with_output_map(self, name: &str, entries: &[(&str, &str)]) -> Self {
        let map = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.lock().maps.insert(name.to_string(), map);
        self
    }

    pub fn fail_on(self, op: InfraOp, dir_suffix: impl Into<PathBuf>) -> Self {
        self.set_fail_on(op, dir_suffix);
        self
    }

    pub fn set_fail_on(&self, op: InfraOp, dir_suffix: impl Into<PathBuf>) {
        self.lock().fail_on = Some(FailOn {
            op,
            dir_suffix: dir_suffix.into(),
        });
    }

    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Every run of `op`, with its directory and credential.
    pub fn runs(&self, op: InfraOp) -> Vec<(PathBuf, Credential)> {
        self.lock()
            .operations
            .iter()
            .filter_map(|o| match o {
                MockOperation::Run {
                    op: kind,
                    dir,
                    credential,
                    ..
                } if *kind == op => Some((dir.clone(), credential.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, op: InfraOp, opts: &InfraOptions) -> Result<(), InfraError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Run {
            op,
            dir: opts.dir.clone(),
            credential: opts.credential.clone(),
            migrate_state: opts.migrate_state,
        });

        match &inner.fail_on {
            Some(fail) if fail.op == op && opts.dir.ends_with(&fail.dir_suffix) => {
                Err(InfraError::CommandFailed {
                    command: format!("terraform {:?}", op).to_lowercase(),
                    dir: opts.dir.clone(),
                    stderr: "injected failure".to_string(),
                })
            }
            _ => Ok(()),
        }
    }

    fn missing(dir: &Path, name: &str) -> InfraError {
        InfraError::Output {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            message: "no such output".to_string(),
        }
    }
}

impl Infra for MockInfra {
    fn init(&self, opts: &InfraOptions) -> Result<(), InfraError> {
        self.record(InfraOp::Init, opts)
    }

    fn plan(&self, opts: &InfraOptions) -> Result<String, InfraError> {
        self.record(InfraOp::Plan, opts)?;
        Ok("No changes.".to_string())
    }

    fn apply(&self, opts: &InfraOptions) -> Result<(), InfraError> {
        self.record(InfraOp::Apply, opts)
    }

    fn destroy(&self, opts: &InfraOptions) -> Result<(), InfraError> {
        self.record(InfraOp::Destroy, opts)
    }

    fn output(&self, dir: &Path, name: &str) -> Result<String, InfraError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Output {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        });
        inner
            .scoped
            .iter()
            .find(|(suffix, n, _)| n == name && dir.ends_with(suffix))
            .map(|(_, _, value)| value)
            .or_else(|| inner.outputs.get(name))
            .cloned()
            .ok_or_else(|| Self::missing(dir, name))
    }

    fn output_map(&self, dir: &Path, name: &str) -> Result<BTreeMap<String, String>, InfraError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Output {
            dir: dir.to_path_buf(),
            name: name.to_string(),
        });
        inner
            .maps
            .get(name)
            .cloned()
            .ok_or_else(|| Self::missing(dir, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outputs_and_maps() {
        let infra = MockInfra::new()
            .with_output("cloudbuild_project_id", "prj-cicd")
            .with_output_map("common_config", &[("default_region", "us-east1")]);

        assert_eq!(
            infra.output(Path::new("/a"), "cloudbuild_project_id").unwrap(),
            "prj-cicd"
        );
        assert_eq!(
            infra.output_map(Path::new("/a"), "common_config").unwrap()["default_region"],
            "us-east1"
        );
        assert!(infra.output(Path::new("/a"), "missing").is_err());
    }

    #[test]
    fn scoped_output_wins_in_its_directory() {
        let infra = MockInfra::new()
            .with_output("cloudbuild_project_id", "prj-cicd")
            .with_output_in("business_unit_1/shared", "cloudbuild_project_id", "prj-infra");

        assert_eq!(
            infra
                .output(Path::new("/c/gcp-projects/business_unit_1/shared"), "cloudbuild_project_id")
                .unwrap(),
            "prj-infra"
        );
        assert_eq!(
            infra.output(Path::new("/f/0-bootstrap"), "cloudbuild_project_id").unwrap(),
            "prj-cicd"
        );
    }

    #[test]
    fn failure_matches_dir_suffix() {
        let infra = MockInfra::new().fail_on(InfraOp::Apply, "envs/shared");

        assert!(infra.apply(&InfraOptions::new("/w/gcp-networks/envs/shared")).is_err());
        assert!(infra.apply(&InfraOptions::new("/w/gcp-networks/envs/production")).is_ok());
        assert!(infra.init(&InfraOptions::new("/w/gcp-networks/envs/shared")).is_ok());
        assert_eq!(infra.runs(InfraOp::Apply).len(), 2);
    }
}
