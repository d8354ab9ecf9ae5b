//! Resolution contracts: validation rules and prompt construction.

mod prompts;
mod validate;

pub use prompts::{
    append_failure, build_resolution_prompt, infer_conflict_type, ConflictType, PromptContext,
};
pub use validate::{
    validate_resolution, Confidence, Language, Resolution, ValidationError, ValidationRule,
};
