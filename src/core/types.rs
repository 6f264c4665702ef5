//! core::types
//!
//! Strong types for core domain concepts.
//!
//! # Types
//!
//! - [`StepName`] - Dotted ledger key of a unit of work
//! - [`BranchName`] - Validated Git branch name
//! - [`Oid`] - Git commit identifier (SHA)
//! - [`Environment`] - Deployment environment, in fixed deploy order
//! - [`UtcTimestamp`] - RFC3339 timestamp
//!
//! # Validation
//!
//! These types enforce validity at construction time. Invalid values
//! cannot be represented, so a malformed step name never reaches the ledger
//! and a malformed SHA never reaches a build filter.
//!
//! # Examples
//!
//! ```
//! use foundation_deployer::core::types::{Environment, StepName};
//!
//! let stage = StepName::new("gcp-org").unwrap();
//! let step = stage.child("production").unwrap();
//! assert_eq!(step.as_str(), "gcp-org.production");
//!
//! assert!(StepName::new("has space").is_err());
//! assert_eq!(Environment::ALL[0], Environment::Production);
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from type validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid step name: {0}")]
    InvalidStepName(String),

    #[error("invalid branch name: {0}")]
    InvalidBranchName(String),

    #[error("invalid object id: {0}")]
    InvalidOid(String),

    #[error("unknown environment: {0}")]
    InvalidEnvironment(String),
}

/// Prefix under which destroy progress is recorded in the ledger.
pub const DESTROY_PREFIX: &str = "destroy";

/// The name of a step in the execution ledger.
///
/// A step name is one or more dot-separated segments. Each segment is
/// non-empty and made of ASCII letters, digits, `-` and `_`. The first
/// segment is by convention the repository of the stage that owns the step
/// (`gcp-bootstrap.migrate-state`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StepName(String);

impl StepName {
    /// Create a new validated step name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidStepName` if any segment is empty or
    /// contains characters outside `[A-Za-z0-9_-]`.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidStepName(
                "step name cannot be empty".into(),
            ));
        }

        for segment in name.split('.') {
            if segment.is_empty() {
                return Err(TypeError::InvalidStepName(format!(
                    "'{}' has an empty segment",
                    name
                )));
            }
            if let Some(c) = segment
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
            {
                return Err(TypeError::InvalidStepName(format!(
                    "'{}' contains invalid character {:?}",
                    name, c
                )));
            }
        }

        Ok(())
    }

    /// Append a segment, producing `self.segment`.
    pub fn child(&self, segment: &str) -> Result<Self, TypeError> {
        Self::new(format!("{}.{}", self.0, segment))
    }

    /// The ledger key used to record tearing this step down.
    pub fn for_destroy(&self) -> Self {
        Self(format!("{}.{}", DESTROY_PREFIX, self.0))
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for StepName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<StepName> for String {
    fn from(name: StepName) -> Self {
        name.0
    }
}

impl FromStr for StepName {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated Git branch name.
///
/// Branch names must conform to the subset of Git's refname rules the
/// deployer relies on:
/// - Cannot be empty
/// - Cannot start with `.` or `-`
/// - Cannot end with `.lock` or `/`
/// - Cannot contain `..`, `@{`, `//`, whitespace or `~^:?*[\`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchName(String);

impl BranchName {
    /// Create a new validated branch name.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidBranchName` if the name violates the rules above.
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), TypeError> {
        if name.is_empty() {
            return Err(TypeError::InvalidBranchName(
                "branch name cannot be empty".into(),
            ));
        }
        if name.starts_with('.') || name.starts_with('-') {
            return Err(TypeError::InvalidBranchName(format!(
                "'{}' cannot start with '.' or '-'",
                name
            )));
        }
        if name.ends_with(".lock") || name.ends_with('/') {
            return Err(TypeError::InvalidBranchName(format!(
                "'{}' cannot end with '.lock' or '/'",
                name
            )));
        }
        for bad in ["..", "@{", "//"] {
            if name.contains(bad) {
                return Err(TypeError::InvalidBranchName(format!(
                    "'{}' cannot contain '{}'",
                    name, bad
                )));
            }
        }
        if let Some(c) = name.chars().find(|c| {
            c.is_whitespace() || c.is_ascii_control() || "~^:?*[\\".contains(*c)
        }) {
            return Err(TypeError::InvalidBranchName(format!(
                "'{}' contains invalid character {:?}",
                name, c
            )));
        }
        Ok(())
    }

    /// Get the branch name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BranchName {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchName> for String {
    fn from(name: BranchName) -> Self {
        name.0
    }
}

impl std::fmt::Display for BranchName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A Git commit identifier (SHA-1 or SHA-256).
///
/// OIDs are normalized to lowercase so build filters compare equal to what
/// the CI system reports.
///
/// # Example
///
/// ```
/// use foundation_deployer::core::types::Oid;
///
/// let oid = Oid::new("ABC123DEF4567890ABC123DEF4567890ABC12345").unwrap();
/// assert_eq!(oid.as_str(), "abc123def4567890abc123def4567890abc12345");
/// assert_eq!(oid.short(7), "abc123d");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Oid(String);

impl Oid {
    /// Create a new OID from a full-length hex string.
    ///
    /// # Errors
    ///
    /// Returns `TypeError::InvalidOid` unless the input is 40 or 64 hex digits.
    pub fn new(hex: impl AsRef<str>) -> Result<Self, TypeError> {
        let hex = hex.as_ref().trim();
        if hex.len() != 40 && hex.len() != 64 {
            return Err(TypeError::InvalidOid(format!(
                "expected 40 or 64 hex characters, got {}",
                hex.len()
            )));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(TypeError::InvalidOid(format!("'{}' is not hex", hex)));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Get the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display.
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }
}

impl TryFrom<String> for Oid {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Oid> for String {
    fn from(oid: Oid) -> Self {
        oid.0
    }
}

impl std::fmt::Display for Oid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A deployment environment.
///
/// Each environment is also the name of the branch whose push triggers the
/// environment's apply build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Production,
    NonProduction,
    Development,
}

impl Environment {
    /// All environments in deploy order.
    pub const ALL: [Environment; 3] = [
        Environment::Production,
        Environment::NonProduction,
        Environment::Development,
    ];

    /// The environment name, also used as branch and directory name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "production",
            Environment::NonProduction => "non-production",
            Environment::Development => "development",
        }
    }

    /// The branch that applies this environment.
    pub fn branch(&self) -> BranchName {
        BranchName(self.as_str().to_string())
    }
}

impl FromStr for Environment {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "production" => Ok(Environment::Production),
            "non-production" => Ok(Environment::NonProduction),
            "development" => Ok(Environment::Development),
            other => Err(TypeError::InvalidEnvironment(other.to_string())),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RFC3339 timestamp in UTC.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtcTimestamp(chrono::DateTime<chrono::Utc>);

impl UtcTimestamp {
    /// Create a timestamp for the current moment.
    pub fn now() -> Self {
        Self(chrono::Utc::now())
    }

    /// Create a timestamp from a chrono DateTime.
    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Self(dt)
    }

    /// Parse an RFC3339 string, as reported by Cloud Build.
    pub fn parse(s: &str) -> Option<Self> {
        chrono::DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| Self(dt.with_timezone(&chrono::Utc)))
    }

    /// Get the underlying datetime.
    pub fn as_datetime(&self) -> &chrono::DateTime<chrono::Utc> {
        &self.0
    }
}

impl std::fmt::Display for UtcTimestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod step_name {
        use super::*;

        #[test]
        fn accepts_dotted_names() {
            for name in [
                "gcp-bootstrap",
                "gcp-bootstrap.production",
                "gcp-projects.bu1.apply-shared",
                "bu1-example-app.gcp-policies-app-infra",
            ] {
                assert!(StepName::new(name).is_ok(), "{} should be valid", name);
            }
        }

        #[test]
        fn rejects_empty_and_malformed() {
            assert!(StepName::new("").is_err());
            assert!(StepName::new(".leading").is_err());
            assert!(StepName::new("trailing.").is_err());
            assert!(StepName::new("a..b").is_err());
            assert!(StepName::new("with space").is_err());
            assert!(StepName::new("slash/name").is_err());
        }

        #[test]
        fn child_appends_segment() {
            let stage = StepName::new("gcp-networks").unwrap();
            assert_eq!(
                stage.child("apply-shared").unwrap().as_str(),
                "gcp-networks.apply-shared"
            );
            assert!(stage.child("").is_err());
        }

        #[test]
        fn destroy_key_is_prefixed() {
            let step = StepName::new("gcp-org.production").unwrap();
            assert_eq!(step.for_destroy().as_str(), "destroy.gcp-org.production");
        }

        #[test]
        fn serde_rejects_invalid() {
            let parsed: Result<StepName, _> = serde_json::from_str("\"bad name\"");
            assert!(parsed.is_err());
        }
    }

    mod branch_name {
        use super::*;

        #[test]
        fn valid_names() {
            assert!(BranchName::new("plan").is_ok());
            assert!(BranchName::new("non-production").is_ok());
            assert!(BranchName::new("feature/x").is_ok());
        }

        #[test]
        fn invalid_names() {
            assert!(BranchName::new("").is_err());
            assert!(BranchName::new("-x").is_err());
            assert!(BranchName::new("a..b").is_err());
            assert!(BranchName::new("x.lock").is_err());
            assert!(BranchName::new("has space").is_err());
            assert!(BranchName::new("a:b").is_err());
        }
    }

    mod oid {
        use super::*;

        #[test]
        fn normalizes_case() {
            let oid = Oid::new("ABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
            assert_eq!(oid.as_str(), "abcdef0123456789abcdef0123456789abcdef01");
        }

        #[test]
        fn trims_trailing_newline() {
            let oid = Oid::new("abcdef0123456789abcdef0123456789abcdef01\n").unwrap();
            assert_eq!(oid.short(8), "abcdef01");
        }

        #[test]
        fn rejects_bad_input() {
            assert!(Oid::new("abc").is_err());
            assert!(Oid::new("z".repeat(40)).is_err());
        }
    }

    mod environment {
        use super::*;

        #[test]
        fn fixed_order() {
            let names: Vec<_> = Environment::ALL.iter().map(|e| e.as_str()).collect();
            assert_eq!(names, ["production", "non-production", "development"]);
        }

        #[test]
        fn parse_and_display() {
            assert_eq!(
                "non-production".parse::<Environment>().unwrap(),
                Environment::NonProduction
            );
            assert_eq!(Environment::Development.to_string(), "development");
            assert!("staging".parse::<Environment>().is_err());
        }

        #[test]
        fn branch_matches_name() {
            assert_eq!(Environment::Production.branch().as_str(), "production");
        }

        #[test]
        fn serde_kebab_case() {
            let json = serde_json::to_string(&Environment::NonProduction).unwrap();
            assert_eq!(json, "\"non-production\"");
        }
    }

    #[test]
    fn timestamp_parses_rfc3339() {
        let ts = UtcTimestamp::parse("2024-03-01T10:00:00.123456Z").unwrap();
        assert_eq!(ts.as_datetime().timestamp(), 1_709_287_200);
        assert!(UtcTimestamp::parse("yesterday").is_none());
    }
}
