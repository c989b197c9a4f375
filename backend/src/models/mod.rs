//! Domain models for the multi-year coordination engine

pub mod checkpoint;
pub mod event;
pub mod record;
pub mod run;

// Re-exports
pub use checkpoint::Checkpoint;
pub use event::{BaselineEntity, BaselineRoster, YearEvent, YearEvents};
pub use record::{RecordDraft, SourceType, StateRecord};
pub use run::{RunMetadata, RunStatus, RunTransition, YearRange};
