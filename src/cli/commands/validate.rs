//! validate command - Check a configuration file

use std::path::Path;

use anyhow::{Context as _, Result};

use crate::cli::Options;
use crate::core::config::Config;
use crate::engine::stages;
use crate::ui::output;

/// Load and validate the configuration, then summarise what would be deployed.
pub fn validate(opts: &Options, config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)
        .with_context(|| format!("Invalid configuration {}", config_path.display()))?;
    let global = &config.global;
    let environments: Vec<String> = stages::environments(&config)
        .iter()
        .map(ToString::to_string)
        .collect();

    output::print(
        format!("configuration {} is valid", config_path.display()),
        opts.verbosity,
    );
    output::print(format!("  organization: {}", global.org_id), opts.verbosity);
    output::print(format!("  networks: {}", global.networks_step_dir()), opts.verbosity);
    output::print(
        format!("  environments: {}", environments.join(", ")),
        opts.verbosity,
    );
    if global.has_validator_project() {
        output::warn(
            "validator_project_id is set, but policy validation is not run by this deployer",
            opts.verbosity,
        );
    }
    Ok(())
}
