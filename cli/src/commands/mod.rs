//! Subcommand implementations.
//!
//! Each `execute` returns `Ok(true)` when the command ended in a state
//! the operator need not act on.

pub mod release;
pub mod run;
pub mod status;
