//! Memory record types, schema migrations, similarity and hashing.
//!
//! The on-disk representation is a single JSON envelope; everything here is
//! pure so the engine's store can stay a thin I/O + locking layer.

mod hash;
mod learner;
mod migrate;
mod records;
mod similarity;

pub use hash::{context_hash, normalize_context, short_id};
pub use learner::{
    detect_naming_style, extract_patterns, suggest, ExecutionSummary, Suggestion,
    SuggestionContext,
};
pub use migrate::{migrate, repair, RepairReport};
pub use records::{
    ClearSelector, DecisionRecord, ExecutionRecord, FileRecord, MemoryEnvelope, MemoryStats,
    PatternKind, PatternRecord, SCHEMA_VERSION,
};
pub use similarity::{edit_distance, similarity};
