//! Status command - last checkpoint and next-year verdict.

use anyhow::Result;
use multiyear_sim_core_rs::StatusReport;

use crate::{Config, OutputFormat};

/// `COMPLETED` once the configured end year is checkpointed, otherwise
/// `BLOCKED:<reason>` or `READY`
fn status_code(status: &StatusReport, end_year: i32) -> String {
    if status.last_completed_year.is_some_and(|y| y >= end_year) {
        return "COMPLETED".to_string();
    }
    match status.next.block_reason {
        Some(reason) => format!("BLOCKED:{}", reason.as_str()),
        None => "READY".to_string(),
    }
}

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the orchestrator cannot be built or the store
/// cannot be read.
pub fn execute(config: &Config) -> Result<bool> {
    let orchestrator = config.orchestrator()?;
    let status = orchestrator.status()?;
    let code = status_code(&status, orchestrator.config().end_year);

    match config.format {
        OutputFormat::Json => {
            let body = serde_json::json!({
                "status": code,
                "report": status,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        OutputFormat::Text => {
            println!("{}", code);
            println!("  scenario:       {}", status.scenario_id);
            match &status.last_checkpoint {
                Some(checkpoint) => println!(
                    "  last completed: {} (checkpoint {}, state {})",
                    checkpoint.year, checkpoint.checkpoint_id, checkpoint.state_hash
                ),
                None => println!("  last completed: none"),
            }
            if let Some(run) = &status.active_run {
                println!("  active run:     {} since {}", run.run_id, run.started_at);
            }
            println!("  next:           {}", status.next.recommendation);
        }
    }
    Ok(!code.starts_with("BLOCKED"))
}
