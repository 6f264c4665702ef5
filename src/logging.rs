//! logging
//!
//! Diagnostic tracing for developers and operators chasing a failed run.
//!
//! Tracing output goes to stderr and is separate from the progress lines in
//! [`crate::ui::output`]. `RUST_LOG` overrides the level picked from the
//! command-line flags:
//!
//! ```bash
//! RUST_LOG=foundation_deployer::engine=debug foundation-deployer deploy --config foundation.toml
//! ```

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::ui::output::Verbosity;

/// Fallback filter when `RUST_LOG` is unset.
pub fn default_level(verbosity: Verbosity) -> &'static str {
    match verbosity {
        Verbosity::Quiet => "error",
        Verbosity::Normal => "warn",
        Verbosity::Debug => "debug",
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    // Fails only when a subscriber is already installed, as in tests.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_follows_verbosity() {
        assert_eq!(default_level(Verbosity::Quiet), "error");
        assert_eq!(default_level(Verbosity::Normal), "warn");
        assert_eq!(default_level(Verbosity::Debug), "debug");
    }

    #[test]
    fn init_twice_is_harmless() {
        init(Verbosity::Quiet);
        init(Verbosity::Debug);
    }
}
