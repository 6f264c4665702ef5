//! builds
//!
//! Abstraction over the hosted CI build system (Cloud Build).
//!
//! # Architecture
//!
//! The [`BuildService`] trait is the only thing the engine needs: list the
//! builds of a repository and describe one build. [`GcloudBuilds`] is the
//! production implementation; [`mock::MockBuildService`] backs the tests.
//!
//! # Modules
//!
//! - `traits`: `BuildService` trait, `BuildRecord`, `BuildStatus`, filters
//! - `gcloud`: implementation on top of `gcloud builds`
//! - [`mock`]: scripted implementation for deterministic testing

mod gcloud;
pub mod mock;
mod traits;

pub use gcloud::GcloudBuilds;
pub use traits::*;

/// Console page of one build.
pub fn build_url(project: &str, region: &str, build_id: &str) -> String {
    format!(
        "https://console.cloud.google.com/cloud-build/builds;region={}/{}?project={}",
        region, build_id, project
    )
}

/// Console page listing the builds of a project.
pub fn console_link(project: &str, region: &str) -> String {
    format!(
        "https://console.cloud.google.com/cloud-build/builds;region={}?project={}",
        region, project
    )
}
