//! engine::destroy
//!
//! Tears the foundation down in reverse stage order.
//!
//! Each environment is destroyed by a local `init` + `destroy` run that
//! impersonates the stage's service account. Destroy steps share the ledger
//! with deploy steps under the `destroy.` prefix, with the same skip and
//! halt behaviour.
//!
//! The bootstrap stage goes last. Its `backend.tf` is moved aside first so
//! `init -migrate-state` brings the state back to local disk before the
//! state bucket itself is destroyed.

use std::path::Path;

use super::pipeline::StageExecutor;
use super::stages::{
    environments, infra_pipeline_dir, BootstrapOutputs, InfraPipelineOutputs, APP_INFRA_DIR,
    APP_INFRA_REPO, BOOTSTRAP_DIR, BOOTSTRAP_REPO, BUSINESS_UNITS, ENVS_DIR, ENVS_REPO, NETWORKS_REPO,
    ORG_DIR, ORG_REPO, PROJECTS_DIR, PROJECTS_REPO,
};
use super::{Context, PipelineError, Services};
use crate::core::config::Config;
use crate::core::files;
use crate::core::ledger::Ledger;
use crate::core::types::{Environment, StepName};
use crate::iac::{InfraOptions, ServiceAccount};

/// Step that completes a destroy run.
fn final_step() -> Result<StepName, PipelineError> {
    Ok(StepName::new(format!("{}.{}", BOOTSTRAP_REPO, Environment::Production))?.for_destroy())
}

/// Destroy the whole foundation, resuming from the ledger.
///
/// # Errors
///
/// Returns the first failure. Failed steps are recorded in the ledger
/// before this returns.
pub fn destroy_all(
    config: &Config,
    services: Services<'_>,
    ctx: Context,
    ledger: &mut Ledger,
) -> Result<(), PipelineError> {
    let exec = StageExecutor::new(config, services, ctx);

    // Bootstrap outputs vanish with the bootstrap state.
    if ledger.is_complete(&final_step()?) {
        exec.say("foundation already destroyed");
        return Ok(());
    }

    let bootstrap_dir = config.foundation_path().join(BOOTSTRAP_DIR);
    let outputs = BootstrapOutputs::read(services.infra, &bootstrap_dir)?;

    let mut envs = environments(config);
    envs.reverse();

    destroy_app_infra(&exec, ledger, &outputs, &envs)?;
    destroy_projects(&exec, ledger, &outputs, &envs)?;
    destroy_networks(&exec, ledger, &outputs, &envs)?;
    destroy_environments(&exec, ledger, &outputs, &envs)?;
    destroy_org(&exec, ledger, &outputs)?;
    destroy_bootstrap(&exec, ledger, &outputs)?;
    Ok(())
}

fn impersonating(dir: impl AsRef<Path>, account: &ServiceAccount) -> InfraOptions {
    InfraOptions::new(dir.as_ref()).impersonating(account.clone())
}

pub fn destroy_app_infra(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
    envs: &[Environment],
) -> Result<(), PipelineError> {
    for env in envs {
        exec.destroy_step(ledger, &format!("{}.{}", APP_INFRA_REPO, env), |_| {
            // Read per step: the projects stage that owns these outputs is
            // destroyed after this one.
            let app = InfraPipelineOutputs::read(
                exec.services().infra,
                &infra_pipeline_dir(exec),
                &outputs.projects_remote_state_bucket,
            )?;
            let repo = exec.clone_repo(APP_INFRA_REPO, APP_INFRA_REPO, &app.infra_pipeline_project)?;
            exec.checkout(&repo, env.as_str())?;

            let dir = repo.path().join(BUSINESS_UNITS[0]).join(env.as_str());
            files::replace_in_file(
                &dir.join("backend.tf"),
                "UPDATE_APP_INFRA_BUCKET",
                &app.state_bucket,
            )?;
            exec.destroy_local(&impersonating(&dir, &app.terraform_sa))
        })?;
    }
    exec.say(format!("end of {} destroy", APP_INFRA_DIR));
    Ok(())
}

pub fn destroy_projects(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
    envs: &[Environment],
) -> Result<(), PipelineError> {
    let repo = exec.clone_repo(PROJECTS_REPO, PROJECTS_REPO, &outputs.cicd_project)?;

    for env in envs {
        exec.destroy_step(ledger, &format!("{}.{}", PROJECTS_REPO, env), |_| {
            exec.checkout(&repo, env.as_str())?;
            for unit in BUSINESS_UNITS {
                let dir = repo.path().join(unit).join(env.as_str());
                exec.destroy_local(&impersonating(dir, &outputs.projects_sa))?;
            }
            Ok(())
        })?;
    }

    for unit in BUSINESS_UNITS {
        let step = format!("{}.{}.apply-shared", PROJECTS_REPO, unit);
        exec.destroy_step(ledger, &step, |_| {
            exec.checkout(&repo, Environment::Production.as_str())?;
            let dir = repo.path().join(unit).join("shared");
            exec.destroy_local(&impersonating(dir, &outputs.projects_sa))
        })?;
    }

    exec.say(format!("end of {} destroy", PROJECTS_DIR));
    Ok(())
}

pub fn destroy_networks(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
    envs: &[Environment],
) -> Result<(), PipelineError> {
    let repo = exec.clone_repo(NETWORKS_REPO, NETWORKS_REPO, &outputs.cicd_project)?;

    for env in envs {
        exec.destroy_step(ledger, &format!("{}.{}", NETWORKS_REPO, env), |_| {
            exec.checkout(&repo, env.as_str())?;
            let dir = repo.path().join("envs").join(env.as_str());
            exec.destroy_local(&impersonating(dir, &outputs.networks_sa))
        })?;
    }

    exec.destroy_step(ledger, &format!("{}.apply-shared", NETWORKS_REPO), |_| {
        exec.checkout(&repo, Environment::Production.as_str())?;
        let dir = repo.path().join("envs").join("shared");
        exec.destroy_local(&impersonating(dir, &outputs.networks_sa))
    })?;

    exec.say(format!(
        "end of {} destroy",
        exec.config().global.networks_step_dir()
    ));
    Ok(())
}

pub fn destroy_environments(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
    envs: &[Environment],
) -> Result<(), PipelineError> {
    let repo = exec.clone_repo(ENVS_REPO, ENVS_REPO, &outputs.cicd_project)?;

    for env in envs {
        exec.destroy_step(ledger, &format!("{}.{}", ENVS_REPO, env), |_| {
            exec.checkout(&repo, env.as_str())?;
            let dir = repo.path().join("envs").join(env.as_str());
            exec.destroy_local(&impersonating(dir, &outputs.environments_sa))
        })?;
    }

    exec.say(format!("end of {} destroy", ENVS_DIR));
    Ok(())
}

pub fn destroy_org(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
) -> Result<(), PipelineError> {
    let repo = exec.clone_repo(ORG_REPO, ORG_REPO, &outputs.cicd_project)?;
    let production = Environment::Production;

    exec.destroy_step(ledger, &format!("{}.{}", ORG_REPO, production), |_| {
        exec.checkout(&repo, production.as_str())?;
        let dir = repo.path().join("envs").join("shared");
        exec.destroy_local(&impersonating(dir, &outputs.org_sa))
    })?;

    exec.say(format!("end of {} destroy", ORG_DIR));
    Ok(())
}

pub fn destroy_bootstrap(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
) -> Result<(), PipelineError> {
    let infra = exec.services().infra;
    let production = Environment::Production;
    let repo = exec.clone_repo(BOOTSTRAP_REPO, BOOTSTRAP_REPO, &outputs.cicd_project)?;
    exec.checkout(&repo, production.as_str())?;

    let tf_dir = repo.path().join("envs").join("shared");
    let backend = tf_dir.join("backend.tf");
    if backend.exists() {
        infra.init(&InfraOptions::new(&tf_dir))?;
        files::copy_file(&backend, &tf_dir.join("backend.tf.backup"))?;
        files::remove_file(&backend)?;
    }

    exec.destroy_step(ledger, &format!("{}.{}", BOOTSTRAP_REPO, production), |_| {
        exec.destroy_local(&InfraOptions::new(&tf_dir).with_migrate_state())
    })?;

    exec.say(format!("end of {} destroy", BOOTSTRAP_DIR));
    Ok(())
}
