//! Command-line orchestration for the blocksmith generator.
//!
//! The command line is itself a script: raw trailing tokens are assembled
//! into instruction text (tags pass through verbatim, everything else is
//! quoted so paths keep their spacing) and handed to the script runtime.
//! Script files are run through the `-Execute` instruction.

use std::io::{self, Write};

use blocksmith_core::{RuntimeError, RunSummary, ScriptRuntime};
use clap::Parser;
use thiserror::Error;

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone)]
#[command(
    name = "blocksmith",
    about = "Fit, rescale, and sample block-structured graph models.",
    after_help = "Run `blocksmith -Help` for the instruction reference."
)]
pub struct Cli {
    /// Instructions, e.g. `-Load model.m1 -Generate nodes.tsv edges.tsv 1`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub instructions: Vec<String>,
}

/// Errors surfaced while executing CLI commands.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum CliError {
    /// The command line carried no instructions at all.
    #[error("no instructions passed to the generator; invoke with '-Help' for documentation")]
    NoInstructions,
    /// The script runtime failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Joins raw command-line tokens back into instruction text.
///
/// Shell splitting already removed any quoting, so arguments are re-quoted
/// here; tags and subtags pass through verbatim.
#[must_use]
pub fn assemble_script(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|token| {
            if token.starts_with('-') || token.starts_with('+') {
                token.clone()
            } else {
                format!("\"{token}\"")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Executes the instructions carried by `cli`.
///
/// # Errors
/// Returns [`CliError::NoInstructions`] for an empty invocation and
/// [`CliError::Runtime`] when any instruction fails.
pub fn run_cli(cli: Cli) -> Result<RunSummary, CliError> {
    if cli.instructions.is_empty() {
        return Err(CliError::NoInstructions);
    }
    let script = assemble_script(&cli.instructions);
    let mut runtime = ScriptRuntime::from_script(&script)?;
    Ok(runtime.run()?)
}

/// Renders `summary` to `writer` in a human-readable text format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &RunSummary, mut writer: impl Write) -> io::Result<()> {
    writeln!(writer, "Finished.")?;
    writeln!(writer, "{} instruction(s) run.", summary.instructions_run)?;
    writeln!(writer, "{} script(s) included.", summary.scripts_included)?;
    writeln!(writer, "{} new graph(s) generated.", summary.graphs_generated)?;
    Ok(())
}
