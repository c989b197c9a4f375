//! Release command - operator override for an abandoned run.

use anyhow::{Context, Result};
use clap::Args;
use uuid::Uuid;

use crate::{Config, OutputFormat};

/// Arguments for the release command.
#[derive(Debug, Args)]
pub struct ReleaseArgs {
    /// Run ID holding RUNNING status.
    #[arg()]
    pub run_id: String,
}

/// Execute the release command.
///
/// # Errors
///
/// Returns an error if the run id is malformed, unknown, or not RUNNING.
pub fn execute(args: &ReleaseArgs, config: &Config) -> Result<bool> {
    let run_id = Uuid::parse_str(&args.run_id)
        .with_context(|| format!("invalid run id {:?}", args.run_id))?;
    let orchestrator = config.orchestrator()?;
    let run = orchestrator.release_run(run_id)?;

    match config.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&run)?),
        OutputFormat::Text => {
            println!("RELEASED");
            println!("  run:            {}", run.run_id);
            println!(
                "  last completed: {}",
                run.last_completed_year
                    .map_or_else(|| "none".to_string(), |y| y.to_string())
            );
            println!("  next:           resume from the last checkpoint");
        }
    }
    Ok(true)
}
