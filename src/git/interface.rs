//! git::interface
//!
//! Source control operations on the CI repositories.
//!
//! # Architecture
//!
//! Every stage keeps its code in a Cloud Source Repository that is cloned
//! under the checkout path. The [`SourceControl`] trait is the only way the
//! engine touches those clones. [`CsrGit`] clones through `gcloud source
//! repos clone`, mutates through the `git` binary (so credential helpers and
//! hooks configured for the user apply) and reads `HEAD` through `git2`.
//!
//! # Example
//!
//! ```ignore
//! use foundation_deployer::git::{CsrGit, SourceControl};
//! use foundation_deployer::core::types::BranchName;
//!
//! let git = CsrGit::default();
//! let repo = git.clone_repo("gcp-org", "/work/gcp-org".as_ref(), "prj-cicd")?;
//! git.checkout_branch(&repo, &BranchName::new("plan")?)?;
//! git.commit(&repo, "Initialize gcp-org repo")?;
//! git.push(&repo, &BranchName::new("plan")?, "origin")?;
//! let sha = git.commit_sha(&repo)?;
//! ```

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::core::types::{BranchName, Oid, TypeError};
use crate::gcloud::{Gcloud, GcloudError};

/// Errors from source control operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The path is not a Git working tree.
    #[error("not a git repository: {path}")]
    NotARepo {
        /// The path that was opened
        path: PathBuf,
    },

    /// Cloning the repository failed.
    #[error("failed to clone '{name}': {source}")]
    Clone {
        /// Repository name
        name: String,
        source: GcloudError,
    },

    /// The `git` binary could not be started.
    #[error("failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    /// A `git` command exited unsuccessfully.
    #[error("'git {command}' failed in {path}: {stderr}")]
    CommandFailed {
        /// The arguments passed to git
        command: String,
        /// Working directory
        path: PathBuf,
        /// Captured standard error
        stderr: String,
    },

    /// `HEAD` did not resolve to a valid commit id.
    #[error(transparent)]
    InvalidOid(#[from] TypeError),

    /// Internal git2 error.
    #[error("git error: {message}")]
    Internal {
        /// The error message
        message: String,
    },
}

impl From<git2::Error> for GitError {
    fn from(err: git2::Error) -> Self {
        GitError::Internal {
            message: err.message().to_string(),
        }
    }
}

/// A cloned repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    name: String,
    path: PathBuf,
}

impl RepoHandle {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Repository name, which is also the CI build filter key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Working tree root.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Source control operations used by the stage pipeline.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
pub trait SourceControl: Send + Sync {
    /// Clone `name` from `project` into `path`, or reuse an existing clone.
    fn clone_repo(&self, name: &str, path: &Path, project: &str) -> Result<RepoHandle, GitError>;

    /// Switch to `branch`, creating it from `HEAD` if it does not exist.
    fn checkout_branch(&self, repo: &RepoHandle, branch: &BranchName) -> Result<(), GitError>;

    /// Stage everything and commit. Having nothing to commit is not an error.
    fn commit(&self, repo: &RepoHandle, message: &str) -> Result<(), GitError>;

    /// Push `branch` to `remote`.
    fn push(&self, repo: &RepoHandle, branch: &BranchName, remote: &str) -> Result<(), GitError>;

    /// The commit `HEAD` points at.
    fn commit_sha(&self, repo: &RepoHandle) -> Result<Oid, GitError>;
}

/// Cloud Source Repositories through `gcloud` and `git`.
#[derive(Debug, Clone, Default)]
pub struct CsrGit {
    gcloud: Gcloud,
}

impl CsrGit {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }

    fn git(&self, repo: &RepoHandle, args: &[&str]) -> Result<(), GitError> {
        debug!(repo = %repo.name, command = %args.join(" "), "running git");

        let output = Command::new("git")
            .args(args)
            .current_dir(&repo.path)
            .output()
            .map_err(GitError::Spawn)?;

        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                path: repo.path.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }

    fn open(repo: &RepoHandle) -> Result<git2::Repository, GitError> {
        git2::Repository::open(&repo.path).map_err(|_| GitError::NotARepo {
            path: repo.path.clone(),
        })
    }

    fn has_staged_changes(&self, repo: &RepoHandle) -> Result<bool, GitError> {
        let status = Command::new("git")
            .args(["diff", "--cached", "--quiet"])
            .current_dir(&repo.path)
            .status()
            .map_err(GitError::Spawn)?;
        Ok(!status.success())
    }
}

impl SourceControl for CsrGit {
    fn clone_repo(&self, name: &str, path: &Path, project: &str) -> Result<RepoHandle, GitError> {
        let handle = RepoHandle::new(name, path);
        if path.join(".git").exists() {
            debug!(repo = name, path = %path.display(), "reusing existing clone");
            Self::open(&handle)?;
            return Ok(handle);
        }

        let target = path.to_string_lossy();
        self.gcloud
            .run(&["source", "repos", "clone", name, &*target, "--project", project])
            .map_err(|source| GitError::Clone {
                name: name.to_string(),
                source,
            })?;
        Ok(handle)
    }

    fn checkout_branch(&self, repo: &RepoHandle, branch: &BranchName) -> Result<(), GitError> {
        let exists = Self::open(repo)?
            .find_branch(branch.as_str(), git2::BranchType::Local)
            .is_ok();

        if exists {
            self.git(repo, &["checkout", branch.as_str()])
        } else {
            self.git(repo, &["checkout", "-b", branch.as_str()])
        }
    }

    fn commit(&self, repo: &RepoHandle, message: &str) -> Result<(), GitError> {
        self.git(repo, &["add", "-A"])?;

        if !self.has_staged_changes(repo)? {
            debug!(repo = %repo.name, "nothing to commit");
            return Ok(());
        }

        self.git(repo, &["commit", "-m", message])
    }

    fn push(&self, repo: &RepoHandle, branch: &BranchName, remote: &str) -> Result<(), GitError> {
        self.git(repo, &["push", remote, branch.as_str()])
    }

    fn commit_sha(&self, repo: &RepoHandle) -> Result<Oid, GitError> {
        let git = Self::open(repo)?;
        let head = git.head()?.peel_to_commit()?.id();
        Ok(Oid::new(head.to_string())?)
    }
}
