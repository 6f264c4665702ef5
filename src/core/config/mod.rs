//! core::config
//!
//! Deployment configuration loading.
//!
//! # Overview
//!
//! The deployer reads a single TOML file passed on the command line. There
//! is no search path: deploying the wrong organization because a stray file
//! was picked up is worse than failing fast.
//!
//! # Example
//!
//! ```no_run
//! use foundation_deployer::core::config::Config;
//!
//! let config = Config::load("foundation.toml").unwrap();
//! println!("Deploying org {}", config.global.org_id);
//! println!("Poll interval: {:?}", config.poll_interval());
//! ```

pub mod schema;

pub use schema::{DeployerSettings, GlobalConfig, ServerAddress};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file '{0}' does not exist")]
    NotFound(PathBuf),

    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid configuration:\n  - {}", .0.join("\n  - "))]
    Invalid(Vec<String>),
}

/// Loaded and validated configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The parsed file.
    pub global: GlobalConfig,
    /// Where it was loaded from.
    path: PathBuf,
}

impl Config {
    /// Load and validate the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the file does not exist
    /// - `ReadError` / `ParseError` if it cannot be read or parsed
    /// - `Invalid` if values fail validation
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load_unvalidated(path)?;
        config.global.validate()?;
        Ok(config)
    }

    /// Load the file without validating values.
    ///
    /// Used by the `validate` command so it can report every problem.
    pub fn load_unvalidated(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let global = Self::parse(path, &contents)?;
        Ok(Self {
            global,
            path: path.to_path_buf(),
        })
    }

    fn parse(path: &Path, contents: &str) -> Result<GlobalConfig, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Build a config directly, for callers that assemble it in code.
    pub fn from_global(global: GlobalConfig) -> Self {
        Self {
            global,
            path: PathBuf::new(),
        }
    }

    /// Path the config was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Root of the foundation source tree.
    pub fn foundation_path(&self) -> &Path {
        Path::new(&self.global.foundation_code_path)
    }

    /// Directory where CI repositories are checked out.
    pub fn checkout_path(&self) -> &Path {
        Path::new(&self.global.code_checkout_path)
    }

    /// Delay between build polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.global.deployer.poll_interval_secs)
    }

    /// Delay before the first build search after a push.
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.global.deployer.initial_delay_secs)
    }

    /// Build query ceiling per wait.
    pub fn max_build_retries(&self) -> u32 {
        self.global.deployer.max_build_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
        org_id = "000000000000"
        billing_account = "000000-000000-000000"
        group_org_admins = "org-admins@example.com"
        group_billing_admins = "billing-admins@example.com"
        billing_data_users = "billing-data@example.com"
        monitoring_workspace_users = "monitoring@example.com"
        audit_data_users = "audit@example.com"
        default_region = "us-central1"
        domain = "example.com."
        domains_to_allow = ["example.com"]
        essential_contacts_domains_to_allow = ["@example.com"]
        scc_notification_name = "scc-notify"
        projects_kms_location = "us"
        projects_gcs_location = "US"
        code_checkout_path = "/tmp/checkout"
        foundation_code_path = "/tmp/foundation"
    "#;

    fn write(temp: &TempDir, contents: &str) -> PathBuf {
        let path = temp.path().join("foundation.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn load_minimal_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, MINIMAL);

        let config = Config::load(&path).unwrap();

        assert_eq!(config.global.org_id, "000000000000");
        assert_eq!(config.poll_interval(), Duration::from_secs(20));
        assert_eq!(config.max_build_retries(), 40);
        assert!(!config.global.enable_hub_and_spoke);
        assert_eq!(config.path(), path);
        assert_eq!(config.foundation_path(), Path::new("/tmp/foundation"));
    }

    #[test]
    fn deployer_table_overrides() {
        let temp = TempDir::new().unwrap();
        let contents = format!(
            "{}\n[deployer]\npoll_interval_secs = 5\nmax_build_retries = 3\nenvironments = [\"production\"]\n",
            MINIMAL
        );
        let path = write(&temp, &contents);

        let config = Config::load(&path).unwrap();

        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.max_build_retries(), 3);
        assert_eq!(config.global.deployer.environments.len(), 1);
        assert_eq!(config.initial_delay(), Duration::from_secs(20));
    }

    #[test]
    fn name_servers_parse() {
        let temp = TempDir::new().unwrap();
        let contents = format!(
            "{}\ntarget_name_server_addresses = [{{ ipv4_address = \"192.168.0.1\", forwarding_path = \"default\" }}]\n",
            MINIMAL
        );
        let path = write(&temp, &contents);

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.global.target_name_server_addresses[0].ipv4_address,
            "192.168.0.1"
        );
    }

    #[test]
    fn missing_file() {
        let temp = TempDir::new().unwrap();
        let err = Config::load(temp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn unknown_fields_rejected() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, &format!("{}\nunknown_field = true\n", MINIMAL));

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn missing_required_key_is_parse_error() {
        let temp = TempDir::new().unwrap();
        let path = write(&temp, "org_id = \"1\"\n");

        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn invalid_values_reported_after_parse() {
        let temp = TempDir::new().unwrap();
        let contents = MINIMAL.replace("example.com.", "example.com");
        let path = write(&temp, &contents);

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref p) if p.len() == 1));
        assert!(err.to_string().contains("domain"));

        // Unvalidated load still succeeds.
        assert!(Config::load_unvalidated(&path).is_ok());
    }
}
