//! Engine configuration with serde-backed defaults.

use std::path::PathBuf;

use momentum_core::CheckDescriptor;
use serde::{Deserialize, Serialize};

const fn default_true() -> bool {
    true
}

const fn default_max_agents() -> usize {
    4
}

fn default_agent_program() -> String {
    "claude".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

const fn default_max_output_bytes() -> usize {
    50 * 1024 * 1024
}

/// Agent pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of concurrently running agents.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
    /// The coding-agent executable.
    #[serde(default = "default_agent_program")]
    pub agent_program: String,
    /// Arguments placed before the task prompt.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Base branch new worktrees fork from.
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    /// Abort later stages once a stage has a failure.
    #[serde(default = "default_true")]
    pub stop_on_failure: bool,
    /// Cap on captured output per agent, in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_agents: default_max_agents(),
            agent_program: default_agent_program(),
            agent_args: Vec::new(),
            base_branch: default_base_branch(),
            stop_on_failure: true,
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

const fn default_qa_iterations() -> u32 {
    10
}

const fn default_error_detail_limit() -> usize {
    8
}

const fn default_context_radius() -> usize {
    5
}

/// QA loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaConfig {
    /// Whether QA runs at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Iteration cap for the check/fix/verify loop.
    #[serde(default = "default_qa_iterations")]
    pub max_iterations: u32,
    /// Configured checks; unlisted kinds pass as skipped.
    #[serde(default)]
    pub checks: Vec<CheckDescriptor>,
    /// How many structured error locations to extract per failure.
    #[serde(default = "default_error_detail_limit")]
    pub error_detail_limit: usize,
    /// Context window radius around error lines, in lines.
    #[serde(default = "default_context_radius")]
    pub context_radius: usize,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: default_qa_iterations(),
            checks: Vec::new(),
            error_detail_limit: default_error_detail_limit(),
            context_radius: default_context_radius(),
        }
    }
}

fn default_target_branch() -> String {
    "main".to_string()
}

const fn default_resolution_retries() -> u32 {
    3
}

const fn default_context_width() -> usize {
    5
}

/// Merge behavior for one worktree merge-back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Branch the worktree merges into.
    #[serde(default = "default_target_branch")]
    pub target_branch: String,
    /// Refuse to merge a worktree whose QA has not passed.
    #[serde(default = "default_true")]
    pub require_qa: bool,
    /// Analyze conflicts without side effects.
    #[serde(default)]
    pub preview: bool,
    /// Validation retry cap per conflicted file.
    #[serde(default = "default_resolution_retries")]
    pub max_resolution_retries: u32,
    /// Context slice width around each hunk, in lines.
    #[serde(default = "default_context_width")]
    pub context_width: usize,
    /// Commit context passed into resolution prompts.
    #[serde(default)]
    pub commit_context: Option<String>,
    /// Project conventions passed into resolution prompts.
    #[serde(default)]
    pub project_conventions: Option<String>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            target_branch: default_target_branch(),
            require_qa: true,
            preview: false,
            max_resolution_retries: default_resolution_retries(),
            context_width: default_context_width(),
            commit_context: None,
            project_conventions: None,
        }
    }
}

fn default_memory_path() -> PathBuf {
    PathBuf::from(".momentum/memory.json")
}

const fn default_decision_ttl_secs() -> u64 {
    24 * 60 * 60
}

const fn default_similarity_threshold() -> f64 {
    0.7
}

/// Memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Location of the memory envelope file.
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
    /// Decision TTL in seconds.
    #[serde(default = "default_decision_ttl_secs")]
    pub decision_ttl_secs: u64,
    /// Default threshold for similar-pattern lookup.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
            decision_ttl_secs: default_decision_ttl_secs(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Agent bus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// Directory for newline-delimited JSON message persistence;
    /// `None` disables persistence.
    #[serde(default)]
    pub persist_dir: Option<PathBuf>,
}

/// Aggregate engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Agent pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
    /// QA loop settings.
    #[serde(default)]
    pub qa: QaConfig,
    /// Merge defaults.
    #[serde(default)]
    pub merge: MergeOptions,
    /// Memory store settings.
    #[serde(default)]
    pub memory: MemoryConfig,
    /// Bus settings.
    #[serde(default)]
    pub bus: BusConfig,
}
