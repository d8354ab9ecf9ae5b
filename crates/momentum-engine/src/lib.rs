//! # Momentum Engine
//!
//! The parallel agent execution and merge-back engine:
//!
//! - [`worktree::WorktreeManager`] owns per-task git worktrees and the
//!   merge-back flow with conflict detection and AI-assisted resolution
//! - [`pool::AgentPool`] schedules coding-agent subprocesses with bounded
//!   concurrency and stage-by-stage dependency execution
//! - [`pool::AgentBus`] carries messages between agents
//! - [`qa::QaRunner`] runs the check / auto-fix / verify loop
//! - [`memory::MemoryStore`] and [`memory::DecisionCache`] persist
//!   patterns, decisions and executions across runs
//!
//! The engine has no network surface and no CLI; callers drive it through
//! these types and observe it through the event stream. AI assistance is
//! an injected capability ([`merge::ResolutionProvider`],
//! [`qa::FixPlanner`]), never a baked-in client.
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

pub mod config;
mod error;
pub mod git;
pub mod memory;
pub mod merge;
pub mod pool;
pub mod qa;
pub mod worktree;

pub use config::{BusConfig, EngineConfig, MemoryConfig, MergeOptions, PoolConfig, QaConfig};
pub use error::{Error, Result};
pub use memory::{CacheStats, DecisionCache, ImportStrategy, MemoryStore};
pub use merge::{ConflictDetector, ConflictResolver, ResolutionProvider, ResolutionStats};
pub use pool::{
    AgentBus, AgentMessage, AgentPool, AgentRecord, AgentState, MessageFilter, RunReport,
    TaskOutcome, BROADCAST_ADDRESS,
};
pub use qa::{fix_stats, FixPlanner, QaRunner, StrategyStats};
pub use worktree::{
    MergeOutcome, MergeStats, MergeStrategy, QueuedConflict, Worktree, WorktreeManager,
};
