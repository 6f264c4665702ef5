//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Deployment Config
//!
//! One TOML file describes the whole foundation. Top-level keys mirror the
//! variables the stages need; the `[deployer]` table tunes the engine.
//!
//! # Validation
//!
//! Values are validated after parsing. All problems are collected so an
//! operator can fix the file in one pass.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::core::types::Environment;

/// A DNS forwarding target for the shared network.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerAddress {
    pub ipv4_address: String,
    #[serde(default)]
    pub forwarding_path: String,
}

/// Engine settings.
///
/// # Example
///
/// ```toml
/// [deployer]
/// poll_interval_secs = 20
/// max_build_retries = 40
/// initial_delay_secs = 20
/// disable_prompt = false
/// environments = ["production", "non-production", "development"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DeployerSettings {
    /// Seconds between build status polls.
    pub poll_interval_secs: u64,
    /// Maximum number of build queries per wait.
    pub max_build_retries: u32,
    /// Seconds to wait after a push before looking for its build.
    pub initial_delay_secs: u64,
    /// Skip the "press enter" pause before handing over to CI.
    pub disable_prompt: bool,
    /// Environments to apply, in order.
    pub environments: Vec<Environment>,
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 20,
            max_build_retries: 40,
            initial_delay_secs: 20,
            disable_prompt: false,
            environments: Environment::ALL.to_vec(),
        }
    }
}

/// The deployment configuration.
///
/// # Example
///
/// ```toml
/// org_id = "000000000000"
/// billing_account = "000000-000000-000000"
/// group_org_admins = "gcp-organization-admins@example.com"
/// group_billing_admins = "gcp-billing-admins@example.com"
/// billing_data_users = "gcp-billing-data@example.com"
/// monitoring_workspace_users = "gcp-monitoring-workspace@example.com"
/// audit_data_users = "gcp-audit-data@example.com"
/// default_region = "us-central1"
/// domain = "example.com."
/// domains_to_allow = ["example.com"]
/// essential_contacts_domains_to_allow = ["@example.com"]
/// scc_notification_name = "scc-notify"
/// projects_kms_location = "us"
/// projects_gcs_location = "US"
/// code_checkout_path = "/workspace/checkout"
/// foundation_code_path = "/workspace/foundation"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GlobalConfig {
    pub org_id: String,
    pub billing_account: String,
    pub group_org_admins: String,
    pub group_billing_admins: String,
    pub billing_data_users: String,
    pub monitoring_workspace_users: String,
    pub audit_data_users: String,
    pub default_region: String,
    #[serde(default)]
    pub parent_folder: Option<String>,
    pub domain: String,
    #[serde(default)]
    pub domains_to_allow: Vec<String>,
    #[serde(default, rename = "essential_contacts_domains_to_allow")]
    pub essential_contacts_domains: Vec<String>,
    #[serde(default)]
    pub perimeter_additional_members: Vec<String>,
    #[serde(default)]
    pub target_name_server_addresses: Vec<ServerAddress>,
    pub scc_notification_name: String,
    #[serde(default)]
    pub project_prefix: Option<String>,
    #[serde(default)]
    pub folder_prefix: Option<String>,
    #[serde(default)]
    pub bucket_force_destroy: Option<bool>,
    #[serde(default)]
    pub audit_logs_table_delete_contents_on_destroy: Option<bool>,
    #[serde(default)]
    pub log_export_storage_force_destroy: Option<bool>,
    #[serde(default)]
    pub enable_hub_and_spoke: bool,
    #[serde(default)]
    pub enable_hub_and_spoke_transitivity: bool,
    #[serde(default)]
    pub create_unique_tag_key: bool,
    pub projects_kms_location: String,
    pub projects_gcs_location: String,
    pub code_checkout_path: String,
    pub foundation_code_path: String,
    #[serde(default)]
    pub validator_project_id: Option<String>,

    #[serde(default)]
    pub deployer: DeployerSettings,
}

impl GlobalConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Every validation problem, in field order.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let required = [
            ("org_id", &self.org_id),
            ("billing_account", &self.billing_account),
            ("default_region", &self.default_region),
            ("scc_notification_name", &self.scc_notification_name),
            ("projects_kms_location", &self.projects_kms_location),
            ("projects_gcs_location", &self.projects_gcs_location),
            ("code_checkout_path", &self.code_checkout_path),
            ("foundation_code_path", &self.foundation_code_path),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                problems.push(format!("{} is required", field));
            }
        }

        let groups = [
            ("group_org_admins", &self.group_org_admins),
            ("group_billing_admins", &self.group_billing_admins),
            ("billing_data_users", &self.billing_data_users),
            ("monitoring_workspace_users", &self.monitoring_workspace_users),
            ("audit_data_users", &self.audit_data_users),
        ];
        for (field, value) in groups {
            if !looks_like_email(value) {
                problems.push(format!("{} must be a group e-mail, got '{}'", field, value));
            }
        }

        if !self.domain.ends_with('.') || self.domain.len() < 2 {
            problems.push(format!(
                "domain must be a fully qualified name ending with '.', got '{}'",
                self.domain
            ));
        }
        if self.domains_to_allow.iter().any(|d| d.trim().is_empty()) {
            problems.push("domains_to_allow cannot contain empty entries".to_string());
        }
        if self
            .target_name_server_addresses
            .iter()
            .any(|s| s.ipv4_address.trim().is_empty())
        {
            problems.push("target_name_server_addresses entries need an ipv4_address".to_string());
        }

        let settings = &self.deployer;
        if settings.poll_interval_secs == 0 {
            problems.push("deployer.poll_interval_secs must be greater than 0".to_string());
        }
        if settings.max_build_retries == 0 {
            problems.push("deployer.max_build_retries must be greater than 0".to_string());
        }
        if !settings.environments.contains(&Environment::Production) {
            problems.push("deployer.environments must include production".to_string());
        }
        for (i, env) in settings.environments.iter().enumerate() {
            if settings.environments[..i].contains(env) {
                problems.push(format!("deployer.environments lists '{}' twice", env));
            }
        }

        problems
    }

    /// True if a policy validator project is configured.
    pub fn has_validator_project(&self) -> bool {
        self.validator_project_id
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty())
    }

    /// Source directory of the networks stage for the selected topology.
    pub fn networks_step_dir(&self) -> &'static str {
        if self.enable_hub_and_spoke {
            "3-networks-hub-and-spoke"
        } else {
            "3-networks-dual-svpc"
        }
    }
}

fn looks_like_email(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    }
}
