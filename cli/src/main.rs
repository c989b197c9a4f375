//! Multi-year simulation CLI.
//!
//! The main entry point for the `multiyear-sim` binary.

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use multiyear_sim_cli::{Cli, Commands};
use multiyear_sim_core_rs::{init_logging, LogFormat};

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    });
    let config = cli.config();

    let ok = match cli.command {
        Commands::Run(args) => multiyear_sim_cli::commands::run::execute(&args, &config)?,
        Commands::Resume(args) => multiyear_sim_cli::commands::run::resume(&args, &config)?,
        Commands::Status => multiyear_sim_cli::commands::status::execute(&config)?,
        Commands::Release(args) => multiyear_sim_cli::commands::release::execute(&args, &config)?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
