//! Multi-Year Orchestrator
//!
//! See `engine.rs` for the year loop and `config.rs` for its settings.

pub mod config;
pub mod engine;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use engine::{
    Orchestrator, RunOutcome, RunReport, StatusReport, YearPhase, YearSummary,
};
