//! builds::mock
//!
//! In-memory build service for deterministic testing.
//!
//! # Design
//!
//! Listings are answered from a queue of scripted responses. Once the queue
//! is empty, every listing reports one already finished build whose status
//! is the repository's configured outcome (`SUCCESS` unless overridden), so a
//! whole pipeline can run against the mock without scripting each wait.
//!
//! Builds can instead be registered per branch. Once any branch has builds,
//! branch scoped listings are answered from those registrations only, the
//! way the real service filters on `BRANCH_NAME`; a branch without builds
//! lists nothing.
//!
//! Describes are answered from per-build status scripts. The last status of
//! a script repeats forever, which models a build stuck in `WORKING`.
//!
//! # Example
//!
//! ```
//! use foundation_deployer::builds::mock::MockBuildService;
//! use foundation_deployer::builds::{BuildRecord, BuildStatus};
//!
//! let service = MockBuildService::new()
//!     .with_listing(vec![BuildRecord::new("b-1", BuildStatus::Queued)])
//!     .with_script("b-1", [BuildStatus::Working, BuildStatus::Success]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use super::traits::{BuildQuery, BuildRecord, BuildService, BuildServiceError, BuildStatus};

/// Mock build service.
///
/// Clones share state, so a test can keep a handle after passing one into
/// the pipeline.
#[derive(Debug, Clone, Default)]
pub struct MockBuildService {
    inner: Arc<Mutex<MockBuildsInner>>,
}

#[derive(Debug, Default)]
struct MockBuildsInner {
    listings: VecDeque<Vec<BuildRecord>>,
    branch_builds: HashMap<String, Vec<BuildRecord>>,
    scripts: HashMap<String, VecDeque<BuildStatus>>,
    repo_outcomes: HashMap<String, BuildStatus>,
    next_build: u64,
    fail_on: Option<FailOn>,
    operations: Vec<MockOperation>,
}

/// Which call should fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    /// Fail every listing with the given message.
    ListBuilds(String),
    /// Fail every describe with the given message.
    DescribeBuild(String),
}

/// Recorded call for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    ListBuilds {
        project: String,
        region: String,
        filter: String,
        limit: Option<u32>,
    },
    DescribeBuild {
        project: String,
        region: String,
        id: String,
    },
}

impl MockBuildService {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockBuildsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue one listing response.
    pub fn with_listing(self, builds: Vec<BuildRecord>) -> Self {
        self.lock().listings.push_back(builds);
        self
    }

    /// Script the statuses returned by successive describes of `id`.
    pub fn with_script(self, id: &str, statuses: impl IntoIterator<Item = BuildStatus>) -> Self {
        self.lock()
            .scripts
            .insert(id.to_string(), statuses.into_iter().collect());
        self
    }

    /// Register the builds listed for pushes of `branch`.
    pub fn set_branch_builds(&self, branch: &str, builds: Vec<BuildRecord>) {
        self.lock().branch_builds.insert(branch.to_string(), builds);
    }

    /// Make unscripted builds of `repo` finish with `status`.
    pub fn set_repo_outcome(&self, repo: &str, status: BuildStatus) {
        self.lock().repo_outcomes.insert(repo.to_string(), status);
    }

    /// Remove an outcome set by [`set_repo_outcome`](Self::set_repo_outcome).
    pub fn clear_repo_outcome(&self, repo: &str) {
        self.lock().repo_outcomes.remove(repo);
    }

    /// Configure a failing call.
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// All recorded calls.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Number of describe calls made.
    pub fn describe_count(&self) -> usize {
        self.lock()
            .operations
            .iter()
            .filter(|op| matches!(op, MockOperation::DescribeBuild { .. }))
            .count()
    }

    /// Filters of every listing, in call order.
    pub fn listed_filters(&self) -> Vec<String> {
        self.lock()
            .operations
            .iter()
            .filter_map(|op| match op {
                MockOperation::ListBuilds { filter, .. } => Some(filter.clone()),
                _ => None,
            })
            .collect()
    }
}

impl BuildService for MockBuildService {
    fn list_builds(&self, query: &BuildQuery) -> Result<Vec<BuildRecord>, BuildServiceError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::ListBuilds {
            project: query.project.clone(),
            region: query.region.clone(),
            filter: query.filter.to_string(),
            limit: query.limit,
        });

        if let Some(FailOn::ListBuilds(msg)) = &inner.fail_on {
            return Err(BuildServiceError::Unavailable(msg.clone()));
        }

        let branch_scoped = match query.filter.branch() {
            Some(branch) if !inner.branch_builds.is_empty() => Some(
                inner
                    .branch_builds
                    .get(branch.as_str())
                    .cloned()
                    .unwrap_or_default(),
            ),
            _ => None,
        };

        let mut builds = match branch_scoped.or_else(|| inner.listings.pop_front()) {
            Some(builds) => builds,
            None => {
                inner.next_build += 1;
                let status = inner
                    .repo_outcomes
                    .get(query.filter.repo())
                    .cloned()
                    .unwrap_or(BuildStatus::Success);
                vec![BuildRecord::new(
                    format!("{}-{}", query.filter.repo(), inner.next_build),
                    status,
                )]
            }
        };

        if let Some(limit) = query.limit {
            builds.truncate(limit as usize);
        }
        Ok(builds)
    }

    fn describe_build(
        &self,
        project: &str,
        region: &str,
        id: &str,
    ) -> Result<BuildRecord, BuildServiceError> {
        let mut inner = self.lock();
        inner.operations.push(MockOperation::DescribeBuild {
            project: project.to_string(),
            region: region.to_string(),
            id: id.to_string(),
        });

        if let Some(FailOn::DescribeBuild(msg)) = &inner.fail_on {
            return Err(BuildServiceError::Unavailable(msg.clone()));
        }

        let script = inner
            .scripts
            .get_mut(id)
            .ok_or_else(|| BuildServiceError::NotFound(id.to_string()))?;
        let status = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
        .ok_or_else(|| BuildServiceError::Malformed(format!("empty script for {}", id)))?;

        Ok(BuildRecord::new(id, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builds::BuildFilter;
    use crate::core::types::BranchName;

    fn query(repo: &str) -> BuildQuery {
        BuildQuery {
            project: "cicd".into(),
            region: "us-central1".into(),
            filter: BuildFilter::for_repo(repo),
            limit: None,
        }
    }

    #[test]
    fn scripted_listing_then_default_success() {
        let service =
            MockBuildService::new().with_listing(vec![BuildRecord::new("x", BuildStatus::Queued)]);

        assert_eq!(service.list_builds(&query("r")).unwrap()[0].id, "x");
        let fallback = service.list_builds(&query("r")).unwrap();
        assert_eq!(fallback.len(), 1);
        assert_eq!(fallback[0].status, BuildStatus::Success);
    }

    #[test]
    fn repo_outcome_applies_to_that_repo_only() {
        let service = MockBuildService::new();
        service.set_repo_outcome("gcp-org", BuildStatus::Failure);

        assert_eq!(
            service.list_builds(&query("gcp-org")).unwrap()[0].status,
            BuildStatus::Failure
        );
        assert_eq!(
            service.list_builds(&query("gcp-envs")).unwrap()[0].status,
            BuildStatus::Success
        );
    }

    #[test]
    fn last_scripted_status_repeats() {
        let service =
            MockBuildService::new().with_script("b", [BuildStatus::Queued, BuildStatus::Working]);

        let statuses: Vec<_> = (0..4)
            .map(|_| service.describe_build("p", "r", "b").unwrap().status)
            .collect();

        assert_eq!(
            statuses,
            vec![
                BuildStatus::Queued,
                BuildStatus::Working,
                BuildStatus::Working,
                BuildStatus::Working
            ]
        );
        assert_eq!(service.describe_count(), 4);
    }

    #[test]
    fn unscripted_describe_not_found() {
        let service = MockBuildService::new();
        assert!(matches!(
            service.describe_build("p", "r", "nope"),
            Err(BuildServiceError::NotFound(_))
        ));
    }

    #[test]
    fn branch_builds_answer_only_their_branch() {
        let service = MockBuildService::new();
        service.set_branch_builds("plan", vec![BuildRecord::new("p", BuildStatus::Success)]);
        let on = |branch: &str| BuildQuery {
            filter: BuildFilter::for_repo("r").with_branch(&BranchName::new(branch).unwrap()),
            ..query("r")
        };

        assert_eq!(service.list_builds(&on("plan")).unwrap()[0].id, "p");
        assert!(service.list_builds(&on("production")).unwrap().is_empty());
        assert_eq!(service.list_builds(&query("r")).unwrap().len(), 1);
    }

    #[test]
    fn fail_on_list() {
        let service = MockBuildService::new().fail_on(FailOn::ListBuilds("down".into()));
        assert!(service.list_builds(&query("r")).is_err());
        service.clear_fail_on();
        assert!(service.list_builds(&query("r")).is_ok());
        assert_eq!(service.listed_filters().len(), 2);
    }
}
