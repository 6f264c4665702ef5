//! git
//!
//! Source control for the CI repositories.
//!
//! # Architecture
//!
//! The [`SourceControl`] trait is the only doorway to the stage repositories.
//! Commands and stages never run `git` themselves.
//!
//! # Responsibilities
//!
//! - Cloning (or reusing) a checkout per repository
//! - Branch checkout, commit and push
//! - Resolving `HEAD` to the commit whose build must be awaited
//!
//! # Invariants
//!
//! - A commit with nothing staged succeeds without creating a commit
//! - `HEAD` is always reported as a validated [`Oid`](crate::core::types::Oid)

mod interface;
pub mod mock;

pub use interface::{CsrGit, GitError, RepoHandle, SourceControl};
