//! # Momentum Core
//!
//! Core domain logic for the momentum parallel-agent engine.
//!
//! This crate is pure: no I/O, no async, no subprocesses. It provides:
//! - Task and dependency-graph types with staged execution planning
//! - Conflict-hunk parsing, categorization and difficulty scoring
//! - Resolution validation and prompt templates
//! - QA check/fix descriptor tables and output classification
//! - Memory record types, schema migrations, similarity and hashing
//! - Pattern extraction and suggestion ranking
//! - Engine event types
//!
//! ## Laws (Compiler Enforced)
//!
//! - No `unwrap()` - returns `Result` instead
//! - No `expect()` - returns `Result` instead
//! - No `panic!()` - returns `Result` instead
//! - No `unsafe` - safe Rust only

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod conflict;
mod error;
pub mod events;
pub mod memory;
pub mod qa;
pub mod resolution;
pub mod resolver;
pub mod task;

pub use conflict::{
    ConflictAnalysis, ConflictCategory, ConflictDocument, ConflictHunk, ConflictSummary,
    FileAnalysis, Recommendation,
};
pub use error::{Error, Result};
pub use events::{Event, EventKind};
pub use memory::{
    DecisionRecord, ExecutionRecord, FileRecord, MemoryEnvelope, MemoryStats, PatternKind,
    PatternRecord, RepairReport, SCHEMA_VERSION,
};
pub use qa::{
    CheckCommand, CheckDescriptor, CheckKind, CheckResult, FixAction, FixAttempt, FixPlan,
    FixStrategy, FixStrategyKind, QaResult,
};
pub use resolution::{Confidence, ConflictType, Resolution, ValidationError};
pub use resolver::{DependencyResolver, Stage, StagePlan};
pub use task::{AgentId, Task, TaskConfig, TaskId, WorktreeName};
