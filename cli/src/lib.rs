//! # multiyear-sim-cli
//!
//! Operator surface for the multi-year simulation engine.
//!
//! ## Commands
//!
//! - `multiyear-sim run` - Run a year range
//! - `multiyear-sim resume` - Continue after the last checkpoint
//! - `multiyear-sim status` - Show the last checkpoint and what comes next
//! - `multiyear-sim release` - Mark an abandoned run as failed
//!
//! Every command prints `COMPLETED`, `BLOCKED:<reason>` or
//! `FAILED:<reason>` followed by a recommendation.
//!
//! ## Configuration
//!
//! - `MULTIYEAR_CONFIG` - Engine config JSON file
//! - `MULTIYEAR_STORE_DIR` - Checkpoint store directory (default: `./state`)
//! - `MULTIYEAR_INPUTS_DIR` - Baseline/events directory (default: `./inputs`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]

pub mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multiyear_sim_core_rs::{
    EngineConfig, FileStore, JsonInputs, Orchestrator, SystemClock,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Multi-year simulation engine command-line interface.
#[derive(Debug, Parser)]
#[command(name = "multiyear-sim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Engine config file (JSON).
    #[arg(long, short = 'c', env = "MULTIYEAR_CONFIG")]
    pub config: PathBuf,

    /// Checkpoint store directory.
    #[arg(long, env = "MULTIYEAR_STORE_DIR", default_value = "./state")]
    pub store_dir: PathBuf,

    /// Baseline and events directory.
    #[arg(long, env = "MULTIYEAR_INPUTS_DIR", default_value = "./inputs")]
    pub inputs_dir: PathBuf,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            config_path: self.config.clone(),
            store_dir: self.store_dir.clone(),
            inputs_dir: self.inputs_dir.clone(),
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a year range.
    Run(commands::run::RunArgs),
    /// Continue from the year after the last checkpoint.
    Resume(commands::run::ResumeArgs),
    /// Show the last checkpoint and the verdict for the next year.
    Status,
    /// Mark an abandoned RUNNING run as FAILED.
    Release(commands::release::ReleaseArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Engine config file.
    pub config_path: PathBuf,
    /// Checkpoint store directory.
    pub store_dir: PathBuf,
    /// Baseline and events directory.
    pub inputs_dir: PathBuf,
    /// Output format.
    pub format: OutputFormat,
}

impl Config {
    /// Build a file-backed orchestrator from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine config cannot be loaded or is
    /// invalid, or the store directory cannot be created.
    pub fn orchestrator(&self) -> Result<Orchestrator<FileStore, JsonInputs>> {
        let engine = EngineConfig::from_json_file(&self.config_path)
            .with_context(|| format!("loading {}", self.config_path.display()))?;
        let store = FileStore::open(&self.store_dir)
            .with_context(|| format!("opening store {}", self.store_dir.display()))?;
        let orchestrator = Orchestrator::new(
            engine,
            Arc::new(store),
            Arc::new(JsonInputs::new(&self.inputs_dir)),
            Arc::new(SystemClock),
        )?;
        Ok(orchestrator)
    }
}
