//! Quality-gate domain types: check descriptors, results, fix strategies.
//!
//! The tables here are closed tagged variants; adding a check or fix kind
//! is an additive change to one table. Running checks and applying fixes
//! is the engine's job.

mod check;
mod fix;

pub use check::{
    CheckCommand, CheckDescriptor, CheckKind, CheckResult, FixAttempt, FixStrategy, QaResult,
};
pub use fix::{
    apply_edit, build_fix_prompt, classify_failure, context_window, extract_error_details,
    ErrorDetail, FixAction, FixPlan, FixStrategyKind,
};
