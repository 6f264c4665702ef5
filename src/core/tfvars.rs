//! core::tfvars
//!
//! Typed stage inputs rendered as Terraform JSON variable files.
//!
//! Terraform loads `terraform.tfvars.json` and `*.auto.tfvars.json`
//! natively, so inputs are serialized with `serde_json` rather than
//! hand-formatted HCL. Unset optional values are omitted so module defaults
//! apply.

use std::fs;
use std::path::Path;

use serde::Serialize;

use super::config::{GlobalConfig, ServerAddress};
use super::files::FileError;
use super::types::Environment;

/// Default variable file name.
pub const TFVARS_FILE: &str = "terraform.tfvars.json";
/// Variables shared by every environment of a stage.
pub const COMMON_AUTO_TFVARS: &str = "common.auto.tfvars.json";
/// Variables for the shared environment of a stage.
pub const SHARED_AUTO_TFVARS: &str = "shared.auto.tfvars.json";
/// Access context manager policy id for the networks stage.
pub const ACCESS_CONTEXT_AUTO_TFVARS: &str = "access_context.auto.tfvars.json";

/// Per-environment variable file, `<environment>.auto.tfvars.json`.
pub fn env_auto_tfvars(env: Environment) -> String {
    format!("{}.auto.tfvars.json", env)
}

/// Serialize `vars` to pretty JSON at `path`, replacing any existing file.
pub fn write_tfvars<T: Serialize>(path: &Path, vars: &T) -> Result<(), FileError> {
    let io = |source| FileError::Io {
        op: "write",
        path: path.to_path_buf(),
        source,
    };
    let mut json = serde_json::to_string_pretty(vars)
        .map_err(|e| io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    json.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(path, json).map_err(io)
}

/// Inputs of the bootstrap stage.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BootstrapTfvars {
    pub org_id: String,
    pub billing_account: String,
    pub group_org_admins: String,
    pub group_billing_admins: String,
    pub default_region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_force_destroy: Option<bool>,
}

impl BootstrapTfvars {
    pub fn from_config(config: &GlobalConfig) -> Self {
        Self {
            org_id: config.org_id.clone(),
            billing_account: config.billing_account.clone(),
            group_org_admins: config.group_org_admins.clone(),
            group_billing_admins: config.group_billing_admins.clone(),
            default_region: config.default_region.clone(),
            parent_folder: config.parent_folder.clone(),
            project_prefix: config.project_prefix.clone(),
            folder_prefix: config.folder_prefix.clone(),
            bucket_force_destroy: config.bucket_force_destroy,
        }
    }
}

/// Inputs of the organization stage.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OrgTfvars {
    pub domains_to_allow: Vec<String>,
    pub essential_contacts_domains_to_allow: Vec<String>,
    pub billing_data_users: String,
    pub audit_data_users: String,
    pub scc_notification_name: String,
    pub remote_state_bucket: String,
    pub enable_hub_and_spoke: bool,
    pub create_access_context_manager_access_policy: bool,
    pub create_unique_tag_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_logs_table_delete_contents_on_destroy: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_export_storage_force_destroy: Option<bool>,
}

impl OrgTfvars {
    pub fn new(config: &GlobalConfig, remote_state_bucket: &str, create_policy: bool) -> Self {
        Self {
            domains_to_allow: config.domains_to_allow.clone(),
            essential_contacts_domains_to_allow: config.essential_contacts_domains.clone(),
            billing_data_users: config.billing_data_users.clone(),
            audit_data_users: config.audit_data_users.clone(),
            scc_notification_name: config.scc_notification_name.clone(),
            remote_state_bucket: remote_state_bucket.to_string(),
            enable_hub_and_spoke: config.enable_hub_and_spoke,
            create_access_context_manager_access_policy: create_policy,
            create_unique_tag_key: config.create_unique_tag_key,
            audit_logs_table_delete_contents_on_destroy: config
                .audit_logs_table_delete_contents_on_destroy,
            log_export_storage_force_destroy: config.log_export_storage_force_destroy,
        }
    }
}

/// Inputs of the environments stage.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EnvsTfvars {
    pub monitoring_workspace_users: String,
    pub remote_state_bucket: String,
}

/// Inputs shared by every networks configuration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NetCommonTfvars {
    pub domain: String,
    pub perimeter_additional_members: Vec<String>,
    pub remote_state_bucket: String,
    /// Only meaningful for the hub-and-spoke topology.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_hub_and_spoke_transitivity: Option<bool>,
}

impl NetCommonTfvars {
    pub fn new(config: &GlobalConfig, remote_state_bucket: &str) -> Self {
        Self {
            domain: config.domain.clone(),
            perimeter_additional_members: config.perimeter_additional_members.clone(),
            remote_state_bucket: remote_state_bucket.to_string(),
            enable_hub_and_spoke_transitivity: config
                .enable_hub_and_spoke
                .then_some(config.enable_hub_and_spoke_transitivity),
        }
    }
}

/// Inputs of the shared networks configuration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NetSharedTfvars {
    pub target_name_server_addresses: Vec<ServerAddress>,
}

/// Access context manager policy used by the networks perimeter.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NetAccessContextTfvars {
    pub access_context_manager_policy_id: String,
}

/// Inputs shared by every projects configuration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjCommonTfvars {
    pub remote_state_bucket: String,
}

/// Inputs of the shared projects configuration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjSharedTfvars {
    pub default_region: String,
}

/// Per-environment project storage locations.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProjEnvTfvars {
    pub projects_kms_location: String,
    pub projects_gcs_location: String,
}

/// Inputs shared by every application infrastructure configuration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppInfraCommonTfvars {
    pub instance_region: String,
    pub remote_state_bucket: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::schema::fixtures::valid_config;
    use tempfile::TempDir;

    fn render<T: Serialize>(vars: &T) -> serde_json::Value {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join(TFVARS_FILE);
        write_tfvars(&path, vars).unwrap();
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap()
    }

    #[test]
    fn bootstrap_omits_unset_optionals() {
        let json = render(&BootstrapTfvars::from_config(&valid_config()));

        assert_eq!(json["org_id"], "000000000000");
        assert_eq!(json["default_region"], "us-central1");
        assert!(json.get("parent_folder").is_none());
        assert!(json.get("bucket_force_destroy").is_none());
    }

    #[test]
    fn bootstrap_includes_set_optionals() {
        let mut config = valid_config();
        config.parent_folder = Some("01234567".into());
        config.bucket_force_destroy = Some(true);

        let json = render(&BootstrapTfvars::from_config(&config));

        assert_eq!(json["parent_folder"], "01234567");
        assert_eq!(json["bucket_force_destroy"], true);
    }

    #[test]
    fn org_uses_terraform_variable_names() {
        let json = render(&OrgTfvars::new(&valid_config(), "bkt-state", true));

        assert_eq!(json["essential_contacts_domains_to_allow"][0], "@example.com");
        assert_eq!(json["remote_state_bucket"], "bkt-state");
        assert_eq!(json["create_access_context_manager_access_policy"], true);
    }

    #[test]
    fn transitivity_only_for_hub_and_spoke() {
        let mut config = valid_config();
        config.enable_hub_and_spoke_transitivity = true;
        assert!(NetCommonTfvars::new(&config, "b")
            .enable_hub_and_spoke_transitivity
            .is_none());

        config.enable_hub_and_spoke = true;
        assert_eq!(
            NetCommonTfvars::new(&config, "b").enable_hub_and_spoke_transitivity,
            Some(true)
        );
    }

    #[test]
    fn name_servers_render_as_objects() {
        let vars = NetSharedTfvars {
            target_name_server_addresses: vec![ServerAddress {
                ipv4_address: "192.168.0.1".into(),
                forwarding_path: "default".into(),
            }],
        };

        let json = render(&vars);

        assert_eq!(
            json["target_name_server_addresses"][0]["ipv4_address"],
            "192.168.0.1"
        );
    }

    #[test]
    fn overwrites_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(TFVARS_FILE);
        fs::write(&path, "stale").unwrap();

        write_tfvars(
            &path,
            &ProjCommonTfvars {
                remote_state_bucket: "b".into(),
            },
        )
        .unwrap();

        assert!(fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn env_file_named_after_environment() {
        assert_eq!(
            env_auto_tfvars(Environment::NonProduction),
            "non-production.auto.tfvars.json"
        );
    }
}
