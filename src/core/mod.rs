//! core
//!
//! Core domain types, persistence, and configuration for the deployer.
//!
//! # Modules
//!
//! - [`types`] - Strong types: StepName, BranchName, Oid, Environment
//! - [`ledger`] - Durable step ledger backing resumable runs
//! - [`config`] - Deployment configuration schema and loading
//! - [`files`] - Copy, find and rewrite files in checkouts
//! - [`tfvars`] - Typed stage inputs rendered for Terraform
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid step and branch names
//! - Every ledger mutation is on disk before it is acknowledged
//! - Configuration is strict and validated up front

pub mod config;
pub mod files;
pub mod ledger;
pub mod tfvars;
pub mod types;
