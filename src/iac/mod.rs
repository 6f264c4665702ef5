//! iac
//!
//! Abstraction over the infrastructure-as-code tool (Terraform).
//!
//! # Modules
//!
//! - `traits`: `Infra` trait, `InfraOptions`, scoped `Credential`
//! - `terraform`: implementation running the `terraform` binary
//! - [`mock`]: in-memory implementation for deterministic testing

pub mod mock;
mod terraform;
mod traits;

pub use terraform::{Terraform, IMPERSONATE_ENV};
pub use traits::*;
