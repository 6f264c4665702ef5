//! engine::stages
//!
//! The fixed foundation pipeline.
//!
//! # Stages
//!
//! | Stage | Repository | Source |
//! |---|---|---|
//! | bootstrap | `gcp-bootstrap` | `0-bootstrap` |
//! | organization | `gcp-org` | `1-org` |
//! | environments | `gcp-environments` | `2-environments` |
//! | networks | `gcp-networks` | `3-networks-dual-svpc` or `3-networks-hub-and-spoke` |
//! | projects | `gcp-projects` | `4-projects` |
//! | application infra | `bu1-example-app` | `5-app-infra` |
//!
//! Each stage runs as one top-level step named after its repository, with
//! its own steps nested inside. Later stages consume outputs of earlier
//! ones; those are read back from Terraform after the producing stage,
//! never stored in the ledger.

use std::path::{Path, PathBuf};

use tracing::info;

use super::pipeline::{StageExecutor, StageSpec, POLICIES_REPO};
use super::waiter::BuildTarget;
use super::{Context, PipelineError, Services};
use crate::builds::{self, BuildFilter};
use crate::core::config::Config;
use crate::core::files;
use crate::core::ledger::Ledger;
use crate::core::tfvars::{
    self, write_tfvars, AppInfraCommonTfvars, BootstrapTfvars, EnvsTfvars, NetAccessContextTfvars,
    NetCommonTfvars, NetSharedTfvars, OrgTfvars, ProjCommonTfvars, ProjEnvTfvars,
    ProjSharedTfvars, ACCESS_CONTEXT_AUTO_TFVARS, COMMON_AUTO_TFVARS, SHARED_AUTO_TFVARS,
    TFVARS_FILE,
};
use crate::core::types::Environment;
use crate::iac::{map_value, Credential, Infra, InfraError, InfraOptions, ServiceAccount};
use crate::ui::{output, prompts};

pub const BOOTSTRAP_REPO: &str = "gcp-bootstrap";
pub const BOOTSTRAP_DIR: &str = "0-bootstrap";
pub const ORG_REPO: &str = "gcp-org";
pub const ORG_DIR: &str = "1-org";
pub const ENVS_REPO: &str = "gcp-environments";
pub const ENVS_DIR: &str = "2-environments";
pub const NETWORKS_REPO: &str = "gcp-networks";
pub const PROJECTS_REPO: &str = "gcp-projects";
pub const PROJECTS_DIR: &str = "4-projects";
pub const APP_INFRA_REPO: &str = "bu1-example-app";
pub const APP_INFRA_DIR: &str = "5-app-infra";

/// Business units of the projects stage.
pub const BUSINESS_UNITS: [&str; 2] = ["business_unit_1", "business_unit_2"];

/// Repository whose build produces the Terraform builder image.
const CLOUDBUILDER_REPO: &str = "tf-cloudbuilder";

/// Outputs of the bootstrap stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapOutputs {
    /// Project hosting the CI repositories and builds.
    pub cicd_project: String,
    pub default_region: String,
    /// Remote state bucket of the foundation stages.
    pub remote_state_bucket: String,
    /// Remote state bucket of the projects stage.
    pub projects_remote_state_bucket: String,
    pub networks_sa: ServiceAccount,
    pub projects_sa: ServiceAccount,
    pub environments_sa: ServiceAccount,
    pub org_sa: ServiceAccount,
}

impl BootstrapOutputs {
    /// Read the outputs of the bootstrap configuration in `dir`.
    pub fn read(infra: &dyn Infra, dir: &Path) -> Result<Self, InfraError> {
        let common = infra.output_map(dir, "common_config")?;
        let sa = |name: &str| -> Result<ServiceAccount, InfraError> {
            ServiceAccount::new(infra.output(dir, name)?)
        };

        Ok(Self {
            cicd_project: infra.output(dir, "cloudbuild_project_id")?,
            default_region: map_value(&common, "common_config", "default_region")?,
            remote_state_bucket: infra.output(dir, "gcs_bucket_tfstate")?,
            projects_remote_state_bucket: infra.output(dir, "projects_gcs_bucket_tfstate")?,
            networks_sa: sa("networks_step_terraform_service_account_email")?,
            projects_sa: sa("projects_step_terraform_service_account_email")?,
            environments_sa: sa("environment_step_terraform_service_account_email")?,
            org_sa: sa("organization_step_terraform_service_account_email")?,
        })
    }

    /// Stage description for a repository hosted in the CI project.
    pub fn stage(&self, repo: &str, source_dir: &str) -> StageSpec {
        StageSpec::new(repo, source_dir, &self.cicd_project, &self.default_region)
    }
}

/// Outputs of the projects stage needed by the application infra stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraPipelineOutputs {
    /// Project hosting the application infra pipeline.
    pub infra_pipeline_project: String,
    pub default_region: String,
    /// Service account the application infra pipeline runs as.
    pub terraform_sa: ServiceAccount,
    /// State bucket of the application infra pipeline.
    pub state_bucket: String,
    /// Remote state bucket of the projects stage.
    pub remote_state_bucket: String,
}

impl InfraPipelineOutputs {
    /// Read the outputs of the shared business unit configuration in `dir`.
    pub fn read(infra: &dyn Infra, dir: &Path, remote_state_bucket: &str) -> Result<Self, InfraError> {
        let accounts = infra.output_map(dir, "terraform_service_accounts")?;
        let buckets = infra.output_map(dir, "state_buckets")?;

        Ok(Self {
            infra_pipeline_project: infra.output(dir, "cloudbuild_project_id")?,
            default_region: infra.output(dir, "default_region")?,
            terraform_sa: ServiceAccount::new(map_value(
                &accounts,
                "terraform_service_accounts",
                APP_INFRA_REPO,
            )?)?,
            state_bucket: map_value(&buckets, "state_buckets", APP_INFRA_REPO)?,
            remote_state_bucket: remote_state_bucket.to_string(),
        })
    }
}

/// Environments to apply, in the fixed deploy order.
pub fn environments(config: &Config) -> Vec<Environment> {
    Environment::ALL
        .into_iter()
        .filter(|env| config.global.deployer.environments.contains(env))
        .collect()
}

/// Directory of the shared projects configuration of the first business unit.
pub fn infra_pipeline_dir(exec: &StageExecutor<'_>) -> PathBuf {
    exec.checkout_dir(PROJECTS_REPO)
        .join(BUSINESS_UNITS[0])
        .join("shared")
}

/// Deploy the whole foundation, resuming from the ledger.
///
/// # Errors
///
/// Returns the first failure. Failed steps are recorded in the ledger
/// before this returns.
pub fn deploy_all(
    config: &Config,
    services: Services<'_>,
    ctx: Context,
    ledger: &mut Ledger,
) -> Result<(), PipelineError> {
    let exec = StageExecutor::new(config, services, ctx);
    if config.global.has_validator_project() {
        output::warn(
            "validator_project_id is set, but policy validation is not run by this deployer",
            ctx.verbosity,
        );
    }

    exec.step(ledger, BOOTSTRAP_REPO, |ledger| deploy_bootstrap(&exec, ledger))?;

    let bootstrap_dir = config.foundation_path().join(BOOTSTRAP_DIR);
    let outputs = BootstrapOutputs::read(services.infra, &bootstrap_dir)?;
    info!(cicd_project = %outputs.cicd_project, "bootstrap outputs read");

    exec.step(ledger, ORG_REPO, |ledger| deploy_org(&exec, ledger, &outputs))?;
    exec.step(ledger, ENVS_REPO, |ledger| {
        deploy_environments(&exec, ledger, &outputs)
    })?;
    exec.step(ledger, NETWORKS_REPO, |ledger| {
        deploy_networks(&exec, ledger, &outputs)
    })?;
    exec.step(ledger, PROJECTS_REPO, |ledger| {
        deploy_projects(&exec, ledger, &outputs)
    })?;

    let infra_outputs = InfraPipelineOutputs::read(
        services.infra,
        &infra_pipeline_dir(&exec),
        &outputs.projects_remote_state_bucket,
    )?;
    exec.step(ledger, APP_INFRA_REPO, |ledger| {
        deploy_app_infra(&exec, ledger, &infra_outputs)
    })?;

    Ok(())
}

/// Bootstrap: local apply, state migration, then hand over to CI.
pub fn deploy_bootstrap(exec: &StageExecutor<'_>, ledger: &mut Ledger) -> Result<(), PipelineError> {
    let config = exec.config();
    let infra = exec.services().infra;
    let foundation = config.foundation_path();
    let tf_dir = foundation.join(BOOTSTRAP_DIR);

    write_tfvars(
        &tf_dir.join(TFVARS_FILE),
        &BootstrapTfvars::from_config(&config.global),
    )?;
    exec.apply_local(&tf_dir, &Credential::Ambient)?;
    let outputs = BootstrapOutputs::read(infra, &tf_dir)?;

    exec.step(ledger, "gcp-bootstrap.migrate-state", |_| {
        let backend = tf_dir.join("backend.tf");
        files::copy_file(&tf_dir.join("backend.tf.example"), &backend)?;
        files::replace_in_file(&backend, "UPDATE_ME", &outputs.remote_state_bucket)?;
        infra.init(&InfraOptions::new(&tf_dir).with_migrate_state())?;
        Ok(())
    })?;

    exec.step(ledger, "gcp-bootstrap.replace-backend-files", |_| {
        for file in files::find_files(foundation, "backend.tf")? {
            files::replace_in_file(&file, "UPDATE_ME", &outputs.remote_state_bucket)?;
            files::replace_in_file(
                &file,
                "UPDATE_PROJECTS_BACKEND",
                &outputs.projects_remote_state_bucket,
            )?;
        }
        Ok(())
    })?;

    exec.say("Follow the Cloud Build execution in the following link:");
    exec.say(builds::console_link(
        &outputs.cicd_project,
        &outputs.default_region,
    ));
    if !exec.context().disable_prompt {
        prompts::press_enter("Press Enter to continue...")?;
    }

    // Triggered by the bootstrap apply, not by a push of ours: no commit to scope to.
    let image = BuildTarget::new(
        &outputs.cicd_project,
        &outputs.default_region,
        BuildFilter::for_repo(CLOUDBUILDER_REPO),
    );
    exec.wait(
        &image,
        "Terraform Image builder Build Failed for tf-cloudbuilder repository.",
    )?;

    exec.policies_repo(
        ledger,
        "gcp-bootstrap.gcp-policies",
        POLICIES_REPO,
        &outputs.cicd_project,
    )?;

    let spec = outputs
        .stage(BOOTSTRAP_REPO, BOOTSTRAP_DIR)
        .with_code_subpath(Path::new("envs").join("shared"));
    let repo = exec.run_stage(ledger, &spec)?;

    exec.step(ledger, "gcp-bootstrap.init-tf", |_| {
        infra.init(&InfraOptions::new(repo.path().join("envs").join("shared")))?;
        Ok(())
    })?;

    exec.say("end of bootstrap deploy");
    Ok(())
}

/// Organization: production only.
pub fn deploy_org(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
) -> Result<(), PipelineError> {
    let config = exec.config();
    let policy = exec
        .services()
        .access_policy
        .access_policy_id(&config.global.org_id)?;

    let vars = OrgTfvars::new(&config.global, &outputs.remote_state_bucket, policy.is_none());
    let shared = config.foundation_path().join(ORG_DIR).join("envs").join("shared");
    write_tfvars(&shared.join(TFVARS_FILE), &vars)?;

    exec.run_stage(ledger, &outputs.stage(ORG_REPO, ORG_DIR))?;
    exec.say(format!("end of {} deploy", ORG_DIR));
    Ok(())
}

pub fn deploy_environments(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
) -> Result<(), PipelineError> {
    let config = exec.config();
    let vars = EnvsTfvars {
        monitoring_workspace_users: config.global.monitoring_workspace_users.clone(),
        remote_state_bucket: outputs.remote_state_bucket.clone(),
    };
    write_tfvars(
        &config.foundation_path().join(ENVS_DIR).join(TFVARS_FILE),
        &vars,
    )?;

    let spec = outputs
        .stage(ENVS_REPO, ENVS_DIR)
        .with_environments(environments(config));
    exec.run_stage(ledger, &spec)?;
    exec.say(format!("end of {} deploy", ENVS_DIR));
    Ok(())
}

/// Networks: the shared configuration is applied locally before the plan.
pub fn deploy_networks(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
) -> Result<(), PipelineError> {
    let config = exec.config();
    let global = &config.global;
    let source_dir = global.networks_step_dir();
    let stage_dir = config.foundation_path().join(source_dir);

    let policy_id = exec
        .services()
        .access_policy
        .access_policy_id(&global.org_id)?
        .ok_or_else(|| PipelineError::MissingAccessPolicy {
            org_id: global.org_id.clone(),
        })?;

    write_tfvars(
        &stage_dir.join(SHARED_AUTO_TFVARS),
        &NetSharedTfvars {
            target_name_server_addresses: global.target_name_server_addresses.clone(),
        },
    )?;
    write_tfvars(
        &stage_dir.join(COMMON_AUTO_TFVARS),
        &NetCommonTfvars::new(global, &outputs.remote_state_bucket),
    )?;
    write_tfvars(
        &stage_dir.join(ACCESS_CONTEXT_AUTO_TFVARS),
        &NetAccessContextTfvars {
            access_context_manager_policy_id: policy_id,
        },
    )?;

    let spec = outputs
        .stage(NETWORKS_REPO, source_dir)
        .with_local_apply(
            "apply-shared",
            Path::new("envs").join("shared"),
            Credential::Impersonate(outputs.networks_sa.clone()),
        )
        .with_environments(environments(config));
    exec.run_stage(ledger, &spec)?;
    exec.say(format!("end of {} deploy", source_dir));
    Ok(())
}

/// Projects: each business unit's shared configuration is applied locally.
pub fn deploy_projects(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &BootstrapOutputs,
) -> Result<(), PipelineError> {
    let config = exec.config();
    let global = &config.global;
    let stage_dir = config.foundation_path().join(PROJECTS_DIR);

    write_tfvars(
        &stage_dir.join(SHARED_AUTO_TFVARS),
        &ProjSharedTfvars {
            default_region: global.default_region.clone(),
        },
    )?;
    write_tfvars(
        &stage_dir.join(COMMON_AUTO_TFVARS),
        &ProjCommonTfvars {
            remote_state_bucket: outputs.remote_state_bucket.clone(),
        },
    )?;
    let env_vars = ProjEnvTfvars {
        projects_kms_location: global.projects_kms_location.clone(),
        projects_gcs_location: global.projects_gcs_location.clone(),
    };
    for env in Environment::ALL {
        write_tfvars(&stage_dir.join(tfvars::env_auto_tfvars(env)), &env_vars)?;
    }

    let mut spec = outputs
        .stage(PROJECTS_REPO, PROJECTS_DIR)
        .with_environments(environments(config));
    for unit in BUSINESS_UNITS {
        spec = spec.with_local_apply(
            format!("{}.apply-shared", unit),
            Path::new(unit).join("shared"),
            Credential::Impersonate(outputs.projects_sa.clone()),
        );
    }
    exec.run_stage(ledger, &spec)?;
    exec.say(format!("end of {} deploy", PROJECTS_DIR));
    Ok(())
}

/// Application infra: runs in the business unit's own pipeline project.
pub fn deploy_app_infra(
    exec: &StageExecutor<'_>,
    ledger: &mut Ledger,
    outputs: &InfraPipelineOutputs,
) -> Result<(), PipelineError> {
    let config = exec.config();
    write_tfvars(
        &config
            .foundation_path()
            .join(APP_INFRA_DIR)
            .join(COMMON_AUTO_TFVARS),
        &AppInfraCommonTfvars {
            instance_region: config.global.default_region.clone(),
            remote_state_bucket: outputs.remote_state_bucket.clone(),
        },
    )?;

    exec.policies_repo(
        ledger,
        "bu1-example-app.gcp-policies-app-infra",
        "gcp-policies-app-infra",
        &outputs.infra_pipeline_project,
    )?;

    let spec = StageSpec::new(
        APP_INFRA_REPO,
        APP_INFRA_DIR,
        &outputs.infra_pipeline_project,
        &outputs.default_region,
    )
    .with_environments(environments(config));
    exec.run_stage(ledger, &spec)?;
    exec.say(format!("end of {} deploy", APP_INFRA_DIR));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::schema::fixtures::valid_config;
    use crate::iac::mock::MockInfra;

    fn bootstrap_infra() -> MockInfra {
        MockInfra::new()
            .with_output("cloudbuild_project_id", "prj-b-cicd")
            .with_output_map("common_config", &[("default_region", "us-east1")])
            .with_output("gcs_bucket_tfstate", "bkt-b-tfstate")
            .with_output("projects_gcs_bucket_tfstate", "bkt-b-projects-tfstate")
            .with_output("networks_step_terraform_service_account_email", "net@p.iam.gserviceaccount.com")
            .with_output("projects_step_terraform_service_account_email", "proj@p.iam.gserviceaccount.com")
            .with_output("environment_step_terraform_service_account_email", "env@p.iam.gserviceaccount.com")
            .with_output("organization_step_terraform_service_account_email", "org@p.iam.gserviceaccount.com")
    }

    #[test]
    fn bootstrap_outputs_read() {
        let outputs = BootstrapOutputs::read(&bootstrap_infra(), Path::new("/f/0-bootstrap")).unwrap();

        assert_eq!(outputs.cicd_project, "prj-b-cicd");
        assert_eq!(outputs.default_region, "us-east1");
        assert_eq!(outputs.projects_remote_state_bucket, "bkt-b-projects-tfstate");
        assert_eq!(outputs.org_sa.as_str(), "org@p.iam.gserviceaccount.com");
    }

    #[test]
    fn bootstrap_outputs_missing_value_fails() {
        let infra = MockInfra::new().with_output_map("common_config", &[("default_region", "r")]);
        assert!(BootstrapOutputs::read(&infra, Path::new("/f")).is_err());
    }

    #[test]
    fn infra_pipeline_outputs_pick_app_entries() {
        let infra = MockInfra::new()
            .with_output("cloudbuild_project_id", "prj-c-infra-pipeline")
            .with_output("default_region", "us-east1")
            .with_output_map(
                "terraform_service_accounts",
                &[("bu1-example-app", "app@p.iam.gserviceaccount.com"), ("other", "o@p.iam.gserviceaccount.com")],
            )
            .with_output_map("state_buckets", &[("bu1-example-app", "bkt-app-state")]);

        let outputs = InfraPipelineOutputs::read(&infra, Path::new("/c"), "bkt-projects").unwrap();

        assert_eq!(outputs.infra_pipeline_project, "prj-c-infra-pipeline");
        assert_eq!(outputs.terraform_sa.as_str(), "app@p.iam.gserviceaccount.com");
        assert_eq!(outputs.state_bucket, "bkt-app-state");
        assert_eq!(outputs.remote_state_bucket, "bkt-projects");
    }

    #[test]
    fn environments_follow_fixed_order() {
        let mut global = valid_config();
        global.deployer.environments = vec![Environment::Development, Environment::Production];

        assert_eq!(
            environments(&Config::from_global(global)),
            vec![Environment::Production, Environment::Development]
        );
    }
}
