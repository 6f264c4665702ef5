//! ui::prompts
//!
//! Interactive pauses.
//!
//! # Design
//!
//! The deployer pauses once, before it starts waiting on CI builds, so the
//! operator can open the build console. Runs without a terminal must disable
//! the pause; reaching end of input is reported rather than treated as
//! consent.

use std::io::{self, BufRead, Write};

use thiserror::Error;

/// Errors from prompts.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("input closed before the prompt was answered")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Print `message` and block until the operator presses enter.
pub fn press_enter(message: &str) -> Result<(), PromptError> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    wait_for_enter(message, &mut input, &mut output)
}

/// [`press_enter`] over arbitrary streams.
pub fn wait_for_enter<R: BufRead, W: Write>(
    message: &str,
    input: &mut R,
    output: &mut W,
) -> Result<(), PromptError> {
    write!(output, "{} ", message)?;
    output.flush()?;

    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(PromptError::Cancelled);
    }
    Ok(())
}
