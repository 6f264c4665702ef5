//! git::mock
//!
//! In-memory source control for deterministic testing.
//!
//! Nothing touches the file system. Every commit advances a counter and
//! [`SourceControl::commit_sha`] reports the counter as a 40 digit hex id,
//! so tests can assert that build filters carry the SHA of the latest push.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use super::interface::{GitError, RepoHandle, SourceControl};
use crate::core::types::{BranchName, Oid};

/// Mock source control.
///
/// Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockGit {
    inner: Arc<Mutex<MockGitInner>>,
}

#[derive(Debug, Default)]
struct MockGitInner {
    commits: u64,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Which call should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    /// Cloning the named repository.
    Clone(String),
    /// Checking out the named branch.
    Checkout(String),
    /// Committing in the named repository.
    Commit(String),
    /// Pushing the named branch.
    Push(String),
}

/// Recorded call for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    Clone {
        repo: String,
        project: String,
    },
    Checkout {
        repo: String,
        branch: String,
    },
    Commit {
        repo: String,
        message: String,
    },
    Push {
        repo: String,
        branch: String,
        remote: String,
    },
}

impl MockGit {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockGitInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configure a failing call.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.set_fail_on(fail_on);
        self
    }

    pub fn set_fail_on(&self, fail_on: FailOn) {
        self.lock().fail_on = Some(fail_on);
    }

    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// All recorded calls.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// `repo:branch` of every push, in call order.
    pub fn pushes(&self) -> Vec<String> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                MockOperation::Push { repo, branch, .. } => Some(format!("{}:{}", repo, branch)),
                _ => None,
            })
            .collect()
    }

    fn sha(n: u64) -> Result<Oid, GitError> {
        Ok(Oid::new(format!("{:040x}", n))?)
    }

    fn check(inner: &MockGitInner, fail: FailOn) -> Result<(), GitError> {
        if inner.fail_on.as_ref() == Some(&fail) {
            return Err(GitError::Internal {
                message: format!("injected failure: {:?}", fail),
            });
        }
        Ok(())
    }
}

impl SourceControl for MockGit {
    fn clone_repo(&self, name: &str, path: &Path, project: &str) -> Result<RepoHandle, GitError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Clone {
            repo: name.to_string(),
            project: project.to_string(),
        });
        Self::check(&inner, FailOn::Clone(name.to_string()))?;
        Ok(RepoHandle::new(name, path))
    }

    fn checkout_branch(&self, repo: &RepoHandle, branch: &BranchName) -> Result<(), GitError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Checkout {
            repo: repo.name().to_string(),
            branch: branch.to_string(),
        });
        Self::check(&inner, FailOn::Checkout(branch.to_string()))
    }

    fn commit(&self, repo: &RepoHandle, message: &str) -> Result<(), GitError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Commit {
            repo: repo.name().to_string(),
            message: message.to_string(),
        });
        Self::check(&inner, FailOn::Commit(repo.name().to_string()))?;
        inner.commits += 1;
        Ok(())
    }

    fn push(&self, repo: &RepoHandle, branch: &BranchName, remote: &str) -> Result<(), GitError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::Push {
            repo: repo.name().to_string(),
            branch: branch.to_string(),
            remote: remote.to_string(),
        });
        Self::check(&inner, FailOn::Push(branch.to_string()))
    }

    fn commit_sha(&self, _repo: &RepoHandle) -> Result<Oid, GitError> {
        Self::sha(self.lock().commits)
    }
}
