//! deploy / destroy commands - Run the stage pipelines

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::builds::GcloudBuilds;
use crate::cli::Options;
use crate::core::config::Config;
use crate::engine::waiter::ThreadSleeper;
use crate::engine::{self, Context, PipelineError, Services};
use crate::gcloud::Gcloud;
use crate::git::CsrGit;
use crate::iac::Terraform;
use crate::ui::output;

/// Production collaborators backed by the `gcloud`, `git` and `terraform` binaries.
struct Toolchain {
    gcloud: Gcloud,
    git: CsrGit,
    infra: Terraform,
    builds: GcloudBuilds,
}

impl Toolchain {
    fn new() -> Self {
        let gcloud = Gcloud::new();
        Self {
            git: CsrGit::new(gcloud.clone()),
            infra: Terraform::new(),
            builds: GcloudBuilds::new(gcloud.clone()),
            gcloud,
        }
    }

    fn services(&self) -> Services<'_> {
        Services {
            git: &self.git,
            infra: &self.infra,
            builds: &self.builds,
            access_policy: &self.gcloud,
            sleeper: &ThreadSleeper,
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

fn resume_hint(err: &PipelineError, command: &str, opts: &Options) {
    if let PipelineError::Step(step) = err {
        if let Some(name) = step.failed_step() {
            output::warn(
                format!(
                    "fix the problem and run {} again to resume at step {}",
                    command, name
                ),
                opts.verbosity,
            );
        }
    }
}

/// Deploy the foundation.
///
/// `--disable-prompt` and `deployer.disable_prompt` in the configuration
/// both skip the pause before handing over to CI.
pub fn deploy(opts: &Options, config_path: &Path, disable_prompt: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let mut ledger = opts.load_ledger()?;
    let ctx = Context {
        verbosity: opts.verbosity,
        disable_prompt: disable_prompt || config.global.deployer.disable_prompt,
    };

    let toolchain = Toolchain::new();
    if let Err(err) = engine::deploy_all(&config, toolchain.services(), ctx, &mut ledger) {
        resume_hint(&err, "deploy", opts);
        return Err(err).context("Deployment failed");
    }

    output::print("foundation deployed", opts.verbosity);
    Ok(())
}

/// Destroy the foundation.
pub fn destroy(opts: &Options, config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let mut ledger = opts.load_ledger()?;
    let ctx = Context {
        verbosity: opts.verbosity,
        disable_prompt: true,
    };

    let toolchain = Toolchain::new();
    if let Err(err) = engine::destroy_all(&config, toolchain.services(), ctx, &mut ledger) {
        resume_hint(&err, "destroy", opts);
        return Err(err).context("Destroy failed");
    }

    output::print("foundation destroyed", opts.verbosity);
    Ok(())
}
