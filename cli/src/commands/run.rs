//! Run and resume commands.

use anyhow::Result;
use clap::Args;
use multiyear_sim_core_rs::RunReport;
use tracing::info;

use crate::{Config, OutputFormat};

/// Arguments for the run command.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// First year to run (defaults to `start_year` from the config).
    #[arg(long)]
    pub start: Option<i32>,

    /// Last year to run (defaults to `end_year` from the config).
    #[arg(long)]
    pub end: Option<i32>,
}

/// Arguments for the resume command.
#[derive(Debug, Args)]
pub struct ResumeArgs {
    /// Last year to run (defaults to `end_year` from the config).
    #[arg(long)]
    pub end: Option<i32>,
}

/// Execute the run command.
///
/// # Errors
///
/// Returns an error if the orchestrator cannot be built or the store
/// fails outside any single year.
pub fn execute(args: &RunArgs, config: &Config) -> Result<bool> {
    let orchestrator = config.orchestrator()?;
    let engine = orchestrator.config();
    let start = args.start.unwrap_or(engine.start_year);
    let end = args.end.unwrap_or(engine.end_year);

    info!(start, end, "run requested");
    let report = orchestrator.run(start, end, engine.resume)?;
    print_report(&report, &config.format)?;
    Ok(report.is_completed())
}

/// Execute the resume command.
///
/// # Errors
///
/// Same as [`execute`].
pub fn resume(args: &ResumeArgs, config: &Config) -> Result<bool> {
    let orchestrator = config.orchestrator()?;
    let engine = orchestrator.config();
    let end = args.end.unwrap_or(engine.end_year);

    info!(end, "resume requested");
    let report = orchestrator.run(engine.first_year, end, true)?;
    print_report(&report, &config.format)?;
    Ok(report.is_completed())
}

fn print_report(report: &RunReport, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!("{}", report.status_code());
            if let Some(run_id) = report.run_id {
                println!("  run:      {}", run_id);
            }
            for year in &report.years {
                println!(
                    "  {}  {} records, {} events, checkpoint {}",
                    year.year, year.record_count, year.event_count, year.checkpoint_id
                );
            }
            println!(
                "  cache:    {} hot / {} warm / {} cold hits, {} misses",
                report.cache.hot_hits,
                report.cache.warm_hits,
                report.cache.cold_hits,
                report.cache.misses
            );
            println!("  next:     {}", report.recommendation);
        }
    }
    Ok(())
}
