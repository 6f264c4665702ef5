//! engine::pipeline
//!
//! The parameterised stage executor.
//!
//! # Architecture
//!
//! Every CI driven stage follows the same template, described by a
//! [`StageSpec`]:
//!
//! ```text
//! checkout plan
//!   -> <repo>.copy-code        stage foundation code into the checkout
//!   -> <repo>.<local apply>*   local init/plan/apply of shared configurations
//!   -> <repo>.plan             commit, push plan, wait for the plan build
//!   -> <repo>.<environment>*   checkout + push env branch, wait for apply build
//! ```
//!
//! Each arrow is a ledger step, so a rerun resumes at the first step that
//! is not complete. Build waits are scoped to the commit and branch just
//! pushed.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::runner::StepRunner;
use super::waiter::{BuildTarget, BuildWaiter, WaitPolicy};
use super::{Context, PipelineError, Services};
use crate::builds::BuildFilter;
use crate::core::config::Config;
use crate::core::files;
use crate::core::ledger::Ledger;
use crate::core::types::{BranchName, Environment, StepName};
use crate::git::RepoHandle;
use crate::iac::{Credential, InfraOptions};
use crate::ui::output;

/// Remote every branch is pushed to.
pub const REMOTE: &str = "origin";

/// Branch whose push triggers the plan build.
pub const PLAN_BRANCH: &str = "plan";

/// Branch of the policy library repositories.
pub const POLICIES_BRANCH: &str = "main";

/// Repository holding the policy library.
pub const POLICIES_REPO: &str = "gcp-policies";

/// CI build definitions copied to the root of every stage repository.
const BUILD_FILES: [&str; 3] = [
    "cloudbuild-tf-apply.yaml",
    "cloudbuild-tf-plan.yaml",
    "tf-wrapper.sh",
];

/// A local run of a shared configuration, before the plan push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalApply {
    /// Step action, appended to the repository name.
    pub action: String,
    /// Configuration directory relative to the checkout.
    pub dir: PathBuf,
    pub credential: Credential,
}

/// Declarative description of one CI driven stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    /// CI repository, also the step name prefix.
    pub repo: String,
    /// Source directory below the foundation code path.
    pub source_dir: String,
    /// Where the code lands inside the checkout, if not its root.
    pub code_subpath: Option<PathBuf>,
    /// CI project hosting the repository and its builds.
    pub project: String,
    pub region: String,
    /// Environments applied after the plan, in order.
    pub environments: Vec<Environment>,
    pub local_applies: Vec<LocalApply>,
}

impl StageSpec {
    pub fn new(
        repo: impl Into<String>,
        source_dir: impl Into<String>,
        project: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            repo: repo.into(),
            source_dir: source_dir.into(),
            code_subpath: None,
            project: project.into(),
            region: region.into(),
            environments: vec![Environment::Production],
            local_applies: Vec::new(),
        }
    }

    pub fn with_code_subpath(mut self, subpath: impl Into<PathBuf>) -> Self {
        self.code_subpath = Some(subpath.into());
        self
    }

    pub fn with_environments(mut self, environments: Vec<Environment>) -> Self {
        self.environments = environments;
        self
    }

    pub fn with_local_apply(
        mut self,
        action: impl Into<String>,
        dir: impl Into<PathBuf>,
        credential: Credential,
    ) -> Self {
        self.local_applies.push(LocalApply {
            action: action.into(),
            dir: dir.into(),
            credential,
        });
        self
    }

    /// Step name `<repo>.<action>`.
    pub fn step(&self, action: &str) -> String {
        format!("{}.{}", self.repo, action)
    }
}

/// Runs stages and their steps against the collaborators.
pub struct StageExecutor<'a> {
    config: &'a Config,
    services: Services<'a>,
    ctx: Context,
    runner: StepRunner,
}

impl<'a> StageExecutor<'a> {
    pub fn new(config: &'a Config, services: Services<'a>, ctx: Context) -> Self {
        Self {
            config,
            services,
            ctx,
            runner: StepRunner::new(ctx.verbosity),
        }
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn services(&self) -> Services<'a> {
        self.services
    }

    pub fn context(&self) -> Context {
        self.ctx
    }

    /// Run `work` as the step `name` through the ledger.
    pub fn step<F>(&self, ledger: &mut Ledger, name: &str, work: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut Ledger) -> Result<(), PipelineError>,
    {
        let name = StepName::new(name)?;
        self.runner.run(ledger, &name, work)?;
        Ok(())
    }

    /// Run `work` as the destroy counterpart of step `name`.
    pub fn destroy_step<F>(&self, ledger: &mut Ledger, name: &str, work: F) -> Result<(), PipelineError>
    where
        F: FnOnce(&mut Ledger) -> Result<(), PipelineError>,
    {
        let name = StepName::new(name)?.for_destroy();
        self.runner.run(ledger, &name, work)?;
        Ok(())
    }

    /// Print a progress line.
    pub fn say(&self, message: impl std::fmt::Display) {
        output::print(message, self.ctx.verbosity);
    }

    /// Checkout directory of a repository.
    pub fn checkout_dir(&self, dir_name: &str) -> PathBuf {
        self.config.checkout_path().join(dir_name)
    }

    /// Clone `repo` from `project` into the checkout directory `dir_name`.
    pub fn clone_repo(&self, repo: &str, dir_name: &str, project: &str) -> Result<RepoHandle, PipelineError> {
        let path = self.checkout_dir(dir_name);
        Ok(self.services.git.clone_repo(repo, &path, project)?)
    }

    /// Switch `repo` to `branch`.
    pub fn checkout(&self, repo: &RepoHandle, branch: &str) -> Result<(), PipelineError> {
        let branch = BranchName::new(branch)?;
        Ok(self.services.git.checkout_branch(repo, &branch)?)
    }

    /// Wait for the newest build of `target` to succeed.
    pub fn wait(&self, target: &BuildTarget, failure_message: &str) -> Result<(), PipelineError> {
        let waiter = BuildWaiter::new(
            self.services.builds,
            self.services.sleeper,
            WaitPolicy::from_config(self.config),
        );
        let build = waiter.wait(target, failure_message)?;
        debug!(build_id = %build.id, "build finished");
        Ok(())
    }

    // =========================================================================
    // Stage template
    // =========================================================================

    /// Run the whole template for `spec`.
    pub fn run_stage(&self, ledger: &mut Ledger, spec: &StageSpec) -> Result<RepoHandle, PipelineError> {
        info!(repo = %spec.repo, "deploying stage");
        let repo = self.clone_repo(&spec.repo, &spec.repo, &spec.project)?;
        self.checkout(&repo, PLAN_BRANCH)?;

        self.step(ledger, &spec.step("copy-code"), |_| {
            self.copy_code(spec, &repo)
        })?;

        for local in &spec.local_applies {
            self.step(ledger, &spec.step(&local.action), |_| {
                self.apply_local(&repo.path().join(&local.dir), &local.credential)
            })?;
        }

        self.step(ledger, &spec.step("plan"), |_| self.plan(spec, &repo))?;

        for env in &spec.environments {
            self.step(ledger, &spec.step(env.as_str()), |_| {
                self.apply_env(spec, &repo, *env)
            })?;
        }

        Ok(repo)
    }

    /// Copy the stage source and the CI build files into the checkout.
    pub fn copy_code(&self, spec: &StageSpec, repo: &RepoHandle) -> Result<(), PipelineError> {
        let foundation = self.config.foundation_path();
        let target = match &spec.code_subpath {
            Some(sub) => repo.path().join(sub),
            None => repo.path().to_path_buf(),
        };

        files::copy_directory(&foundation.join(&spec.source_dir), &target)?;
        for file in BUILD_FILES {
            files::copy_file(&foundation.join("build").join(file), &repo.path().join(file))?;
        }
        Ok(())
    }

    /// Commit the staged code, push the plan branch and wait for its build.
    pub fn plan(&self, spec: &StageSpec, repo: &RepoHandle) -> Result<(), PipelineError> {
        let git = self.services.git;
        let branch = BranchName::new(PLAN_BRANCH)?;
        git.commit(repo, &format!("Initialize {} repo", spec.repo))?;
        git.push(repo, &branch, REMOTE)?;

        let sha = git.commit_sha(repo)?;
        let target = BuildTarget::new(
            &spec.project,
            &spec.region,
            BuildFilter::for_repo(&spec.repo)
                .with_commit(sha)
                .with_branch(&branch),
        );
        self.wait(&target, &format!("Terraform {} plan build Failed.", spec.repo))
    }

    /// Push the environment branch and wait for its apply build.
    pub fn apply_env(&self, spec: &StageSpec, repo: &RepoHandle, env: Environment) -> Result<(), PipelineError> {
        let git = self.services.git;
        let branch = env.branch();
        git.checkout_branch(repo, &branch)?;
        git.push(repo, &branch, REMOTE)?;

        let sha = git.commit_sha(repo)?;
        let target = BuildTarget::new(
            &spec.project,
            &spec.region,
            BuildFilter::for_repo(&spec.repo)
                .with_commit(sha)
                .with_branch(&branch),
        );
        self.wait(
            &target,
            &format!("Terraform {} apply {} build Failed.", spec.repo, env),
        )
    }

    /// Local init, plan and apply of the configuration in `dir`.
    pub fn apply_local(&self, dir: &Path, credential: &Credential) -> Result<(), PipelineError> {
        let infra = self.services.infra;
        let opts = InfraOptions {
            dir: dir.to_path_buf(),
            credential: credential.clone(),
            migrate_state: false,
        };

        infra.init(&opts)?;
        let plan = infra.plan(&opts)?;
        output::debug(&plan, self.ctx.verbosity);
        infra.apply(&opts)?;
        Ok(())
    }

    /// Local init and destroy of the configuration in `opts.dir`.
    pub fn destroy_local(&self, opts: &InfraOptions) -> Result<(), PipelineError> {
        let infra = self.services.infra;
        infra.init(opts)?;
        infra.destroy(opts)?;
        Ok(())
    }

    /// Seed the policy library repository as step `step`.
    ///
    /// The repository is cloned into `dir_name` below the checkout path.
    pub fn policies_repo(
        &self,
        ledger: &mut Ledger,
        step: &str,
        dir_name: &str,
        project: &str,
    ) -> Result<(), PipelineError> {
        let repo = self.clone_repo(POLICIES_REPO, dir_name, project)?;
        self.step(ledger, step, |_| {
            let git = self.services.git;
            let branch = BranchName::new(POLICIES_BRANCH)?;
            git.checkout_branch(&repo, &branch)?;
            files::copy_directory(
                &self.config.foundation_path().join("policy-library"),
                repo.path(),
            )?;
            git.commit(&repo, "Initialize policy library repo")?;
            git.push(&repo, &branch, REMOTE)?;
            Ok(())
        })
    }
}
