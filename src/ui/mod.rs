//! ui
//!
//! User interaction utilities.
//!
//! # Modules
//!
//! - [`output`] - Progress, warning and error lines
//! - [`prompts`] - Interactive pauses
//!
//! # Design
//!
//! All operator facing output and prompts go through this module so quiet
//! mode and non-interactive runs behave consistently.

pub mod output;
pub mod prompts;
