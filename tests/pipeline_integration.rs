//! Integration tests for the deploy and destroy pipelines.
//!
//! These tests run the full stage sequence against the in-memory
//! collaborators and a foundation source tree created with tempfile, and
//! check the resume behaviour the ledger gives across runs.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use foundation_deployer::builds::mock::MockBuildService;
use foundation_deployer::builds::BuildStatus;
use foundation_deployer::core::config::{Config, GlobalConfig};
use foundation_deployer::core::ledger::{Ledger, StepStatus};
use foundation_deployer::core::types::{Environment, StepName};
use foundation_deployer::engine::waiter::RecordingSleeper;
use foundation_deployer::engine::{deploy_all, destroy_all, Context, PipelineError, Services};
use foundation_deployer::gcloud::FixedAccessPolicy;
use foundation_deployer::git::mock::{MockGit, MockOperation};
use foundation_deployer::iac::mock::{InfraOp, MockInfra, MockOperation as InfraOperation};
use foundation_deployer::iac::{Credential, ServiceAccount};
use foundation_deployer::ui::output::Verbosity;

// =============================================================================
// Test Fixtures
// =============================================================================

const NETWORKS_SA: &str = "sa-terraform-net@prj-b-seed.iam.gserviceaccount.com";
const PROJECTS_SA: &str = "sa-terraform-proj@prj-b-seed.iam.gserviceaccount.com";
const APP_SA: &str = "sa-tf-cb-bu1-example-app@prj-c-bu1-infra.iam.gserviceaccount.com";

const BUILD_FILES: [&str; 3] = [
    "cloudbuild-tf-apply.yaml",
    "cloudbuild-tf-plan.yaml",
    "tf-wrapper.sh",
];

/// A foundation source tree, a checkout directory and mock collaborators.
struct Harness {
    temp: TempDir,
    config: Config,
    git: MockGit,
    infra: MockInfra,
    builds: MockBuildService,
    policy: FixedAccessPolicy,
    sleeper: RecordingSleeper,
}

impl Harness {
    fn new() -> Self {
        Self::with_policy(Some("1234567890"))
    }

    fn with_policy(policy: Option<&str>) -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let foundation = temp.path().join("foundation");
        write_foundation(&foundation);

        let global = GlobalConfig {
            org_id: "000000000000".into(),
            billing_account: "000000-000000-000000".into(),
            group_org_admins: "org-admins@example.com".into(),
            group_billing_admins: "billing-admins@example.com".into(),
            billing_data_users: "billing-data@example.com".into(),
            monitoring_workspace_users: "monitoring@example.com".into(),
            audit_data_users: "audit@example.com".into(),
            default_region: "us-central1".into(),
            domain: "example.com.".into(),
            domains_to_allow: vec!["example.com".into()],
            essential_contacts_domains: vec!["@example.com".into()],
            scc_notification_name: "scc-notify".into(),
            projects_kms_location: "us".into(),
            projects_gcs_location: "US".into(),
            code_checkout_path: temp.path().join("checkout").display().to_string(),
            foundation_code_path: foundation.display().to_string(),
            ..Default::default()
        };

        Self {
            config: Config::from_global(global),
            temp,
            git: MockGit::new(),
            infra: stage_outputs(),
            builds: MockBuildService::new(),
            policy: FixedAccessPolicy(policy.map(String::from)),
            sleeper: RecordingSleeper::new(),
        }
    }

    fn services(&self) -> Services<'_> {
        Services {
            git: &self.git,
            infra: &self.infra,
            builds: &self.builds,
            access_policy: &self.policy,
            sleeper: &self.sleeper,
        }
    }

    fn ctx() -> Context {
        Context {
            verbosity: Verbosity::Quiet,
            disable_prompt: true,
        }
    }

    fn ledger(&self) -> Ledger {
        Ledger::load(self.temp.path().join(".steps.json")).expect("load ledger")
    }

    fn deploy(&self, ledger: &mut Ledger) -> Result<(), PipelineError> {
        deploy_all(&self.config, self.services(), Self::ctx(), ledger)
    }

    fn destroy(&self, ledger: &mut Ledger) -> Result<(), PipelineError> {
        destroy_all(&self.config, self.services(), Self::ctx(), ledger)
    }

    fn foundation(&self) -> PathBuf {
        self.temp.path().join("foundation")
    }

    fn checkout(&self) -> PathBuf {
        self.temp.path().join("checkout")
    }

    fn pushes_of(&self, repo: &str) -> Vec<String> {
        self.git
            .pushes()
            .into_iter()
            .filter(|p| p.starts_with(&format!("{}:", repo)))
            .collect()
    }

    fn runs_in(&self, op: InfraOp, suffix: &str) -> Vec<Credential> {
        self.infra
            .runs(op)
            .into_iter()
            .filter(|(dir, _)| dir.ends_with(suffix))
            .map(|(_, credential)| credential)
            .collect()
    }
}

fn write(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
    fs::write(path, contents).expect("write file");
}

fn write_foundation(root: &Path) {
    write(&root.join("0-bootstrap/main.tf"), "# bootstrap\n");
    write(
        &root.join("0-bootstrap/backend.tf.example"),
        "terraform {\n  backend \"gcs\" {\n    bucket = \"UPDATE_ME\"\n  }\n}\n",
    );
    for file in BUILD_FILES {
        write(&root.join("build").join(file), file);
    }
    write(&root.join("policy-library/policies/constraints.yaml"), "kind: x\n");
    write(&root.join("1-org/envs/shared/main.tf"), "# org\n");
    write(&root.join("1-org/envs/shared/backend.tf"), "bucket = \"UPDATE_ME\"\n");
    write(&root.join("2-environments/envs/production/main.tf"), "# env\n");
    write(&root.join("3-networks-dual-svpc/envs/shared/main.tf"), "# net\n");
    write(
        &root.join("4-projects/business_unit_1/shared/backend.tf"),
        "bucket = \"UPDATE_PROJECTS_BACKEND\"\n",
    );
    write(&root.join("4-projects/business_unit_2/shared/main.tf"), "# bu2\n");
    for env in Environment::ALL {
        write(
            &root.join("5-app-infra/business_unit_1").join(env.as_str()).join("backend.tf"),
            "bucket = \"UPDATE_APP_INFRA_BUCKET\"\n",
        );
    }
}

/// Outputs of the bootstrap and business unit configurations.
fn stage_outputs() -> MockInfra {
    MockInfra::new()
        .with_output("cloudbuild_project_id", "prj-b-cicd")
        .with_output_map("common_config", &[("default_region", "us-central1")])
        .with_output("gcs_bucket_tfstate", "bkt-b-tfstate")
        .with_output("projects_gcs_bucket_tfstate", "bkt-b-projects-tfstate")
        .with_output("networks_step_terraform_service_account_email", NETWORKS_SA)
        .with_output("projects_step_terraform_service_account_email", PROJECTS_SA)
        .with_output(
            "environment_step_terraform_service_account_email",
            "sa-terraform-env@prj-b-seed.iam.gserviceaccount.com",
        )
        .with_output(
            "organization_step_terraform_service_account_email",
            "sa-terraform-org@prj-b-seed.iam.gserviceaccount.com",
        )
        .with_output_in(
            "business_unit_1/shared",
            "cloudbuild_project_id",
            "prj-c-bu1-infra-pipeline",
        )
        .with_output("default_region", "us-central1")
        .with_output_map("terraform_service_accounts", &[("bu1-example-app", APP_SA)])
        .with_output_map("state_buckets", &[("bu1-example-app", "bkt-bu1-app-tfstate")])
}

fn step(name: &str) -> StepName {
    StepName::new(name).expect("valid step name")
}

fn impersonating(email: &str) -> Credential {
    Credential::Impersonate(ServiceAccount::new(email).expect("valid account"))
}

const STAGES: [&str; 6] = [
    "gcp-bootstrap",
    "gcp-org",
    "gcp-environments",
    "gcp-networks",
    "gcp-projects",
    "bu1-example-app",
];

// =============================================================================
// Deploy
// =============================================================================

mod deploy {
    use super::*;

    #[test]
    fn full_run_completes_every_stage() {
        let h = Harness::new();
        let mut ledger = h.ledger();

        h.deploy(&mut ledger).expect("deploy");

        for stage in STAGES {
            assert!(ledger.is_complete(&step(stage)), "{}", stage);
        }
        for env in Environment::ALL {
            assert!(ledger.is_complete(&step(&format!("gcp-projects.{}", env))));
        }
        assert_eq!(h.pushes_of("gcp-org"), vec!["gcp-org:plan", "gcp-org:production"]);
        assert_eq!(
            h.pushes_of("gcp-networks"),
            vec![
                "gcp-networks:plan",
                "gcp-networks:production",
                "gcp-networks:non-production",
                "gcp-networks:development",
            ]
        );
    }

    #[test]
    fn second_run_does_nothing() {
        let h = Harness::new();
        let mut ledger = h.ledger();
        h.deploy(&mut ledger).expect("first deploy");
        let pushes = h.git.pushes().len();
        let applies = h.infra.runs(InfraOp::Apply).len();

        h.deploy(&mut ledger).expect("second deploy");

        assert_eq!(h.git.pushes().len(), pushes);
        assert_eq!(h.infra.runs(InfraOp::Apply).len(), applies);
    }

    #[test]
    fn stage_inputs_written() {
        let h = Harness::new();
        let mut ledger = h.ledger();

        h.deploy(&mut ledger).expect("deploy");

        let bootstrap = fs::read_to_string(h.foundation().join("0-bootstrap/terraform.tfvars.json"))
            .expect("bootstrap tfvars");
        let vars: serde_json::Value = serde_json::from_str(&bootstrap).expect("json");
        assert_eq!(vars["org_id"], "000000000000");
        assert!(vars.get("parent_folder").is_none());

        let access = fs::read_to_string(
            h.foundation()
                .join("3-networks-dual-svpc/access_context.auto.tfvars.json"),
        )
        .expect("access context tfvars");
        assert!(access.contains("1234567890"));

        for env in Environment::ALL {
            let file = h
                .foundation()
                .join("4-projects")
                .join(format!("{}.auto.tfvars.json", env));
            assert!(file.exists(), "{}", file.display());
        }
    }

    #[test]
    fn bootstrap_state_moves_to_bucket() {
        let h = Harness::new();
        let mut ledger = h.ledger();

        h.deploy(&mut ledger).expect("deploy");

        let backend = fs::read_to_string(h.foundation().join("0-bootstrap/backend.tf"))
            .expect("backend.tf");
        assert!(backend.contains("bkt-b-tfstate"));
        let org_backend = fs::read_to_string(h.foundation().join("1-org/envs/shared/backend.tf"))
            .expect("org backend");
        assert!(org_backend.contains("bkt-b-tfstate"));
        let projects_backend =
            fs::read_to_string(h.foundation().join("4-projects/business_unit_1/shared/backend.tf"))
                .expect("projects backend");
        assert!(projects_backend.contains("bkt-b-projects-tfstate"));

        assert!(h.infra.operations().iter().any(|op| matches!(
            op,
            InfraOperation::Run { op: InfraOp::Init, dir, migrate_state: true, .. }
                if dir.ends_with("foundation/0-bootstrap")
        )));
    }

    #[test]
    fn local_applies_use_stage_accounts() {
        let h = Harness::new();
        let mut ledger = h.ledger();

        h.deploy(&mut ledger).expect("deploy");

        assert_eq!(h.runs_in(InfraOp::Apply, "foundation/0-bootstrap"), vec![Credential::Ambient]);
        assert_eq!(
            h.runs_in(InfraOp::Apply, "gcp-networks/envs/shared"),
            vec![impersonating(NETWORKS_SA)]
        );
        for unit in ["business_unit_1", "business_unit_2"] {
            assert_eq!(
                h.runs_in(InfraOp::Apply, &format!("gcp-projects/{}/shared", unit)),
                vec![impersonating(PROJECTS_SA)]
            );
        }
    }

    #[test]
    fn pushed_builds_are_awaited_by_commit() {
        let h = Harness::new();
        let mut ledger = h.ledger();

        h.deploy(&mut ledger).expect("deploy");

        let filters = h.builds.listed_filters();
        assert_eq!(filters[0], "source.repoSource.repoName:tf-cloudbuilder");
        assert!(filters[1..]
            .iter()
            .all(|f| f.contains(" AND substitutions.COMMIT_SHA:")));
        assert!(filters[1..]
            .iter()
            .all(|f| f.contains(" AND substitutions.BRANCH_NAME:")));
        assert_eq!(filters.len(), 1 + h.git.pushes().len() - 2);
    }

    #[test]
    fn app_infra_uses_its_own_pipeline_project() {
        let h = Harness::new();
        let mut ledger = h.ledger();

        h.deploy(&mut ledger).expect("deploy");

        let clones: Vec<_> = h
            .git
            .operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::Clone { repo, project } => Some((repo, project)),
                _ => None,
            })
            .collect();
        assert!(clones.contains(&("bu1-example-app".to_string(), "prj-c-bu1-infra-pipeline".to_string())));
        assert!(clones.contains(&("gcp-org".to_string(), "prj-b-cicd".to_string())));
        assert!(h
            .checkout()
            .join("gcp-policies-app-infra/policies/constraints.yaml")
            .exists());
    }

    #[test]
    fn configured_environments_only() {
        let mut h = Harness::new();
        let mut global = h.config.global.clone();
        global.deployer.environments = vec![Environment::Development, Environment::Production];
        h.config = Config::from_global(global);
        let mut ledger = h.ledger();

        h.deploy(&mut ledger).expect("deploy");

        assert_eq!(
            h.pushes_of("gcp-environments"),
            vec![
                "gcp-environments:plan",
                "gcp-environments:production",
                "gcp-environments:development",
            ]
        );
    }
}

// =============================================================================
// Resume
// =============================================================================

mod resume {
    use super::*;

    #[test]
    fn failed_build_halts_the_run() {
        let h = Harness::new();
        let mut ledger = h.ledger();
        h.builds.set_repo_outcome("gcp-networks", BuildStatus::Failure);

        let err = h.deploy(&mut ledger).expect_err("networks plan fails");

        match &err {
            PipelineError::Step(inner) => {
                assert_eq!(inner.failed_step(), Some(&step("gcp-networks.plan")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let recorded = ledger.error(&step("gcp-networks.plan"));
        assert!(recorded.starts_with("Terraform gcp-networks plan build Failed.\nSee:\n"));
        assert!(recorded.ends_with("for details."));
        assert_eq!(
            ledger.record(&step("gcp-networks")).map(|r| r.status),
            Some(StepStatus::Error)
        );
        assert!(ledger.is_complete(&step("gcp-environments")));
        assert!(h.pushes_of("gcp-projects").is_empty());
    }

    #[test]
    fn rerun_resumes_at_failed_step() {
        let h = Harness::new();
        let mut ledger = h.ledger();
        h.builds.set_repo_outcome("gcp-networks", BuildStatus::Failure);
        assert!(h.deploy(&mut ledger).is_err());

        h.builds.clear_repo_outcome("gcp-networks");
        h.deploy(&mut ledger).expect("resumed deploy");

        for stage in STAGES {
            assert!(ledger.is_complete(&step(stage)), "{}", stage);
        }
        assert_eq!(h.pushes_of("gcp-org"), vec!["gcp-org:plan", "gcp-org:production"]);
        assert_eq!(h.runs_in(InfraOp::Apply, "gcp-networks/envs/shared").len(), 1);
        assert_eq!(h.runs_in(InfraOp::Apply, "foundation/0-bootstrap").len(), 1);
        assert_eq!(ledger.error(&step("gcp-networks.plan")), "");
    }

    #[test]
    fn resume_survives_a_new_process() {
        let h = Harness::new();
        let mut ledger = h.ledger();
        h.builds.set_repo_outcome("gcp-projects", BuildStatus::Timeout);
        assert!(h.deploy(&mut ledger).is_err());
        drop(ledger);

        h.builds.clear_repo_outcome("gcp-projects");
        let mut reloaded = h.ledger();
        assert!(reloaded.is_complete(&step("gcp-networks")));
        h.deploy(&mut reloaded).expect("resumed deploy");

        assert_eq!(h.pushes_of("gcp-networks").len(), 4);
        assert!(reloaded.is_complete(&step("bu1-example-app")));
    }

    #[test]
    fn missing_access_policy_stops_networks() {
        let h = Harness::with_policy(None);
        let mut ledger = h.ledger();

        let err = h.deploy(&mut ledger).expect_err("networks needs a policy");

        assert!(ledger.is_complete(&step("gcp-org")));
        assert!(ledger
            .error(&step("gcp-networks"))
            .contains("no access context manager policy"));
        assert!(err.to_string().contains("gcp-networks"));
        assert!(h.pushes_of("gcp-networks").is_empty());
    }
}

// =============================================================================
// Destroy
// =============================================================================

mod destroy {
    use super::*;

    fn deployed() -> (Harness, Ledger) {
        let h = Harness::new();
        let mut ledger = h.ledger();
        h.deploy(&mut ledger).expect("deploy");
        (h, ledger)
    }

    #[test]
    fn tears_down_in_reverse_order() {
        let (h, mut ledger) = deployed();

        h.destroy(&mut ledger).expect("destroy");

        let dirs: Vec<_> = h.infra.runs(InfraOp::Destroy).into_iter().map(|(d, _)| d).collect();
        assert_eq!(dirs.len(), 20);
        assert!(dirs[0].ends_with("bu1-example-app/business_unit_1/development"));
        assert!(dirs[2].ends_with("bu1-example-app/business_unit_1/production"));
        assert!(dirs[3].ends_with("gcp-projects/business_unit_1/development"));
        assert!(dirs[18].ends_with("gcp-org/envs/shared"));
        assert!(dirs[19].ends_with("gcp-bootstrap/envs/shared"));
        assert!(ledger.is_complete(&step("destroy.gcp-bootstrap.production")));
        assert!(ledger.is_complete(&step("gcp-bootstrap.production")));
    }

    #[test]
    fn stage_accounts_are_impersonated() {
        let (h, mut ledger) = deployed();

        h.destroy(&mut ledger).expect("destroy");

        assert_eq!(
            h.runs_in(InfraOp::Destroy, "bu1-example-app/business_unit_1/production"),
            vec![impersonating(APP_SA)]
        );
        assert_eq!(
            h.runs_in(InfraOp::Destroy, "gcp-networks/envs/shared"),
            vec![impersonating(NETWORKS_SA)]
        );
        assert_eq!(
            h.runs_in(InfraOp::Destroy, "gcp-bootstrap/envs/shared"),
            vec![Credential::Ambient]
        );
    }

    #[test]
    fn app_backend_points_at_state_bucket() {
        let (h, mut ledger) = deployed();

        h.destroy(&mut ledger).expect("destroy");

        let backend = fs::read_to_string(
            h.checkout()
                .join("bu1-example-app/business_unit_1/production/backend.tf"),
        )
        .expect("app backend");
        assert!(backend.contains("bkt-bu1-app-tfstate"));
    }

    #[test]
    fn bootstrap_backend_moved_aside() {
        let (h, mut ledger) = deployed();

        h.destroy(&mut ledger).expect("destroy");

        let shared = h.checkout().join("gcp-bootstrap/envs/shared");
        assert!(!shared.join("backend.tf").exists());
        assert!(shared.join("backend.tf.backup").exists());
        assert!(h.infra.operations().iter().any(|op| matches!(
            op,
            InfraOperation::Run { op: InfraOp::Destroy, dir, migrate_state: true, .. }
                if dir.ends_with("gcp-bootstrap/envs/shared")
        )));
    }

    #[test]
    fn failure_resumes_at_failed_step() {
        let (h, mut ledger) = deployed();
        h.infra.set_fail_on(InfraOp::Destroy, "gcp-networks/envs/shared");

        assert!(h.destroy(&mut ledger).is_err());
        assert!(ledger.is_complete(&step("destroy.gcp-networks.production")));
        assert_eq!(
            ledger.record(&step("destroy.gcp-networks.apply-shared")).map(|r| r.status),
            Some(StepStatus::Error)
        );
        assert!(h.runs_in(InfraOp::Destroy, "gcp-org/envs/shared").is_empty());

        h.infra.clear_fail_on();
        h.destroy(&mut ledger).expect("resumed destroy");

        assert_eq!(
            h.runs_in(InfraOp::Destroy, "gcp-projects/business_unit_2/shared").len(),
            1
        );
        assert_eq!(h.runs_in(InfraOp::Destroy, "gcp-networks/envs/shared").len(), 2);
        assert_eq!(h.runs_in(InfraOp::Destroy, "gcp-org/envs/shared").len(), 1);
    }

    #[test]
    fn finished_destroy_is_a_no_op() {
        let (h, mut ledger) = deployed();
        h.destroy(&mut ledger).expect("destroy");
        let runs = h.infra.runs(InfraOp::Destroy).len();

        h.destroy(&mut ledger).expect("second destroy");

        assert_eq!(h.infra.runs(InfraOp::Destroy).len(), runs);
    }
}
