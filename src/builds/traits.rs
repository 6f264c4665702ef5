//! builds::traits
//!
//! Build service trait and the records it exchanges.
//!
//! # Design
//!
//! The trait is synchronous: the deployer blocks on one build at a time, and
//! each call is a single short-lived `gcloud` invocation.

use std::fmt;

use thiserror::Error;

use crate::core::types::{BranchName, Oid, UtcTimestamp};
use crate::gcloud::GcloudError;

/// Errors from build service operations.
#[derive(Debug, Error)]
pub enum BuildServiceError {
    /// The underlying `gcloud` call failed.
    #[error(transparent)]
    Gcloud(#[from] GcloudError),

    /// A build record could not be understood.
    #[error("malformed build record: {0}")]
    Malformed(String),

    /// The requested build does not exist.
    #[error("build not found: {0}")]
    NotFound(String),

    /// The service could not be reached.
    #[error("build service unavailable: {0}")]
    Unavailable(String),
}

/// Cloud Build status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    Unknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
    /// A status this version does not know about. Treated as terminal.
    Other(String),
}

impl BuildStatus {
    /// Parse a status as reported by Cloud Build.
    pub fn parse(s: &str) -> Self {
        match s {
            "STATUS_UNKNOWN" => BuildStatus::Unknown,
            "PENDING" => BuildStatus::Pending,
            "QUEUED" => BuildStatus::Queued,
            "WORKING" => BuildStatus::Working,
            "SUCCESS" => BuildStatus::Success,
            "FAILURE" => BuildStatus::Failure,
            "INTERNAL_ERROR" => BuildStatus::InternalError,
            "TIMEOUT" => BuildStatus::Timeout,
            "CANCELLED" => BuildStatus::Cancelled,
            "EXPIRED" => BuildStatus::Expired,
            other => BuildStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BuildStatus::Unknown => "STATUS_UNKNOWN",
            BuildStatus::Pending => "PENDING",
            BuildStatus::Queued => "QUEUED",
            BuildStatus::Working => "WORKING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Failure => "FAILURE",
            BuildStatus::InternalError => "INTERNAL_ERROR",
            BuildStatus::Timeout => "TIMEOUT",
            BuildStatus::Cancelled => "CANCELLED",
            BuildStatus::Expired => "EXPIRED",
            BuildStatus::Other(s) => s,
        }
    }

    /// True once the build can no longer change status.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            BuildStatus::Queued | BuildStatus::Working | BuildStatus::Pending
        )
    }

    pub fn is_success(&self) -> bool {
        *self == BuildStatus::Success
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecord {
    pub id: String,
    pub status: BuildStatus,
    pub create_time: Option<UtcTimestamp>,
}

impl BuildRecord {
    pub fn new(id: impl Into<String>, status: BuildStatus) -> Self {
        Self {
            id: id.into(),
            status,
            create_time: None,
        }
    }
}

/// Selects the builds of one repository, optionally of one commit and
/// branch.
///
/// Environment branches are cut from the plan commit, so the commit alone
/// does not tell the plan build from the apply builds; pushes that share a
/// commit are told apart by branch.
///
/// # Example
///
/// ```
/// use foundation_deployer::builds::BuildFilter;
/// use foundation_deployer::core::types::{BranchName, Oid};
///
/// let sha = Oid::new("0123456789abcdef0123456789abcdef01234567").unwrap();
/// let filter = BuildFilter::for_repo("gcp-org")
///     .with_commit(sha)
///     .with_branch(&BranchName::new("production").unwrap());
/// assert_eq!(
///     filter.to_string(),
///     "source.repoSource.repoName:gcp-org AND substitutions.COMMIT_SHA:0123456789abcdef0123456789abcdef01234567 AND substitutions.BRANCH_NAME:production"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFilter {
    repo: String,
    commit: Option<Oid>,
    branch: Option<BranchName>,
}

impl BuildFilter {
    pub fn for_repo(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            commit: None,
            branch: None,
        }
    }

    pub fn with_commit(mut self, commit: Oid) -> Self {
        self.commit = Some(commit);
        self
    }

    pub fn with_branch(mut self, branch: &BranchName) -> Self {
        self.branch = Some(branch.clone());
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn commit(&self) -> Option<&Oid> {
        self.commit.as_ref()
    }

    pub fn branch(&self) -> Option<&BranchName> {
        self.branch.as_ref()
    }
}

impl fmt::Display for BuildFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source.repoSource.repoName:{}", self.repo)?;
        if let Some(sha) = &self.commit {
            write!(f, " AND substitutions.COMMIT_SHA:{}", sha)?;
        }
        if let Some(branch) = &self.branch {
            write!(f, " AND substitutions.BRANCH_NAME:{}", branch)?;
        }
        Ok(())
    }
}

/// A build listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildQuery {
    pub project: String,
    pub region: String,
    pub filter: BuildFilter,
    /// Maximum number of builds to return.
    pub limit: Option<u32>,
}

/// The build listing and describe API.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`.
pub trait BuildService: Send + Sync {
    /// Builds matching the query, newest first.
    fn list_builds(&self, query: &BuildQuery) -> Result<Vec<BuildRecord>, BuildServiceError>;

    /// The current state of one build.
    fn describe_build(
        &self,
        project: &str,
        region: &str,
        id: &str,
    ) -> Result<BuildRecord, BuildServiceError>;
}
