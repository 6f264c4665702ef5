//! builds::gcloud
//!
//! Cloud Build access through `gcloud builds list/describe`.

use serde::Deserialize;

use super::traits::{BuildQuery, BuildRecord, BuildService, BuildServiceError, BuildStatus};
use crate::core::types::UtcTimestamp;
use crate::gcloud::Gcloud;

/// Cloud Build service backed by the `gcloud` CLI.
#[derive(Debug, Clone, Default)]
pub struct GcloudBuilds {
    gcloud: Gcloud,
}

impl GcloudBuilds {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

/// The fields of a Cloud Build resource the deployer reads.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBuild {
    id: String,
    status: String,
    #[serde(default)]
    create_time: Option<String>,
}

impl From<RawBuild> for BuildRecord {
    fn from(raw: RawBuild) -> Self {
        BuildRecord {
            id: raw.id,
            status: BuildStatus::parse(&raw.status),
            create_time: raw.create_time.as_deref().and_then(UtcTimestamp::parse),
        }
    }
}

fn parse_listing(value: serde_json::Value) -> Result<Vec<BuildRecord>, BuildServiceError> {
    let raw: Vec<RawBuild> =
        serde_json::from_value(value).map_err(|e| BuildServiceError::Malformed(e.to_string()))?;
    let mut builds: Vec<BuildRecord> = raw.into_iter().map(BuildRecord::from).collect();
    // Newest first, whatever order the service used.
    builds.sort_by(|a, b| b.create_time.cmp(&a.create_time));
    Ok(builds)
}

fn parse_build(value: serde_json::Value) -> Result<BuildRecord, BuildServiceError> {
    serde_json::from_value::<RawBuild>(value)
        .map(BuildRecord::from)
        .map_err(|e| BuildServiceError::Malformed(e.to_string()))
}

impl BuildService for GcloudBuilds {
    fn list_builds(&self, query: &BuildQuery) -> Result<Vec<BuildRecord>, BuildServiceError> {
        let filter = query.filter.to_string();
        let limit = query.limit.map(|l| l.to_string());

        let mut args = vec![
            "builds",
            "list",
            "--project",
            query.project.as_str(),
            "--region",
            query.region.as_str(),
            "--filter",
            filter.as_str(),
            "--sort-by",
            "~createTime",
        ];
        if let Some(limit) = &limit {
            args.extend(["--limit", limit.as_str()]);
        }

        parse_listing(self.gcloud.run_json(&args)?)
    }

    fn describe_build(
        &self,
        project: &str,
        region: &str,
        id: &str,
    ) -> Result<BuildRecord, BuildServiceError> {
        let value = self.gcloud.run_json(&[
            "builds",
            "describe",
            id,
            "--project",
            project,
            "--region",
            region,
        ])?;
        parse_build(value)
    }
}
