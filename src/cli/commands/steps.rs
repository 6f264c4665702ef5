//! steps / reset commands - Inspect and edit the ledger

use anyhow::{Context as _, Result};

use crate::cli::Options;
use crate::core::types::StepName;
use crate::ui::output;

/// List completed steps, or every recorded step with `all`.
///
/// A missing ledger lists nothing.
pub fn steps(opts: &Options, all: bool) -> Result<()> {
    let ledger = opts.load_ledger()?;

    if !all {
        for name in ledger.completed() {
            println!("{}", name);
        }
        return Ok(());
    }

    for (name, status) in ledger.list() {
        // Build failures carry the console link on later lines.
        match ledger.error(name).lines().next() {
            Some(error) if !error.is_empty() => println!("{}\t{}\t{}", name, status, error),
            _ => println!("{}\t{}", name, status),
        }
    }
    Ok(())
}

/// Return `step` to pending.
pub fn reset(opts: &Options, step: &str) -> Result<()> {
    let name = StepName::new(step).with_context(|| format!("Invalid step name '{}'", step))?;
    let mut ledger = opts.load_ledger()?;

    let removed = ledger
        .reset(&name)
        .with_context(|| format!("Failed to update ledger {}", opts.ledger.display()))?;
    if removed {
        output::print(format!("step {} reset", name), opts.verbosity);
    } else {
        output::print(format!("step {} is not recorded", name), opts.verbosity);
    }
    Ok(())
}
