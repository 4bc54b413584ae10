pub mod dedup;
pub mod engine;

pub use dedup::{BatchDeduplicator, DedupOutcome, DroppedDuplicate};
pub use engine::{CommitMode, ReconcileOutcome, ReconciliationEngine, SkipReason};
