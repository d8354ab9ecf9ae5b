//! Conflict-type aware resolution prompt templates.
//!
//! Prompt construction is deterministic: same conflict, same context, same
//! string. The engine never calls a model itself; callers supply the
//! provider and receive these prompts through it.

use serde::{Deserialize, Serialize};

use crate::conflict::ConflictHunk;
use crate::resolution::validate::Language;

/// The dominant nature of a conflicted region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictType {
    /// Import/require/use statement conflicts.
    Import,
    /// Function bodies or signatures.
    Function,
    /// Class/struct/interface/enum shapes.
    DataStructure,
    /// Configuration files.
    Configuration,
    /// Comment-only conflicts.
    Comment,
    /// Everything else.
    General,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import => write!(f, "import"),
            Self::Function => write!(f, "function"),
            Self::DataStructure => write!(f, "data-structure"),
            Self::Configuration => write!(f, "configuration"),
            Self::Comment => write!(f, "comment"),
            Self::General => write!(f, "general"),
        }
    }
}

const IMPORT_MARKERS: &[&str] = &["import ", "from ", "require(", "use ", "#include"];
const FUNCTION_MARKERS: &[&str] = &["fn ", "function ", "def ", "func ", "=>"];
const STRUCTURE_MARKERS: &[&str] = &["class ", "struct ", "interface ", "enum ", "trait "];
const CONFIG_EXTENSIONS: &[&str] = &[".json", ".yaml", ".yml", ".toml", ".ini", ".env"];

fn any_line_contains(hunks: &[ConflictHunk], markers: &[&str]) -> bool {
    hunks.iter().any(|hunk| {
        hunk.ours
            .iter()
            .chain(hunk.theirs.iter())
            .any(|line| markers.iter().any(|m| line.contains(m)))
    })
}

fn comment_only(hunks: &[ConflictHunk]) -> bool {
    let is_comment = |line: &String| {
        let t = line.trim_start();
        t.is_empty()
            || t.starts_with("//")
            || t.starts_with('#')
            || t.starts_with("/*")
            || t.starts_with('*')
            || t.starts_with("--")
    };
    hunks.iter().all(|hunk| {
        hunk.ours.iter().all(is_comment) && hunk.theirs.iter().all(is_comment)
    })
}

/// Infer the conflict type. Order matters: import > function >
/// data-structure > configuration > comment > general; first hit wins.
#[must_use]
pub fn infer_conflict_type(path: &str, hunks: &[ConflictHunk]) -> ConflictType {
    if any_line_contains(hunks, IMPORT_MARKERS) {
        return ConflictType::Import;
    }
    if any_line_contains(hunks, FUNCTION_MARKERS) {
        return ConflictType::Function;
    }
    if any_line_contains(hunks, STRUCTURE_MARKERS) {
        return ConflictType::DataStructure;
    }
    let lower = path.to_lowercase();
    if CONFIG_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) || lower.contains("config") {
        return ConflictType::Configuration;
    }
    if comment_only(hunks) {
        return ConflictType::Comment;
    }
    ConflictType::General
}

/// Extra context supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptContext {
    /// Recent commit messages or merge intent.
    pub commit_context: Option<String>,
    /// Project conventions the resolution should respect.
    pub project_conventions: Option<String>,
}

const fn objectives(conflict_type: ConflictType) -> &'static [&'static str] {
    match conflict_type {
        ConflictType::Import => &[
            "combine the unique imports from both sides",
            "remove duplicate imports",
            "preserve the existing import grouping",
            "sort imports by the language's convention",
            "preserve import aliases",
        ],
        ConflictType::Function => &[
            "preserve the intended behavior of both changes where compatible",
            "keep function signatures consistent with their call sites",
            "prefer the more complete implementation when both changed the same logic",
            "keep error handling from both sides",
        ],
        ConflictType::DataStructure => &[
            "merge added fields and variants from both sides",
            "keep field ordering stable where possible",
            "preserve derived or implemented traits and annotations from both sides",
        ],
        ConflictType::Configuration => &[
            "merge keys from both sides",
            "prefer the newer value when both sides changed the same key",
            "keep the file format valid",
        ],
        ConflictType::Comment => &[
            "combine the information from both comments",
            "drop exact duplicates",
        ],
        ConflictType::General => &[
            "integrate the intent of both sides",
            "prefer keeping behavior from the current branch when the changes are incompatible",
        ],
    }
}

/// Build the deterministic resolution prompt for one conflicted file.
#[must_use]
pub fn build_resolution_prompt(
    path: &str,
    language: Language,
    hunks: &[ConflictHunk],
    context: &PromptContext,
) -> String {
    let conflict_type = infer_conflict_type(path, hunks);
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Resolve the merge conflict in `{path}` ({} conflict, language: {}).\n\n",
        conflict_type,
        language.tag()
    ));

    if let Some(commit_context) = &context.commit_context {
        prompt.push_str(&format!("Merge context:\n{commit_context}\n\n"));
    }
    if let Some(conventions) = &context.project_conventions {
        prompt.push_str(&format!("Project conventions:\n{conventions}\n\n"));
    }

    prompt.push_str("Resolution objectives:\n");
    for objective in objectives(conflict_type) {
        prompt.push_str(&format!("- {objective}\n"));
    }
    prompt.push('\n');

    prompt.push_str(&format!("The file has {} conflicted region(s).\n\n", hunks.len()));

    for (index, hunk) in hunks.iter().enumerate() {
        prompt.push_str(&format!("## Conflict {}\n", index + 1));
        if !hunk.context_before.is_empty() {
            prompt.push_str("Context before:\n```\n");
            for line in &hunk.context_before {
                prompt.push_str(line);
                prompt.push('\n');
            }
            prompt.push_str("```\n");
        }
        prompt.push_str(&format!(
            "Current branch ({}):\n```\n",
            hunk.ours_label.as_deref().unwrap_or("ours")
        ));
        for line in &hunk.ours {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push_str("```\n");
        prompt.push_str(&format!(
            "Incoming branch ({}):\n```\n",
            hunk.theirs_label.as_deref().unwrap_or("theirs")
        ));
        for line in &hunk.theirs {
            prompt.push_str(line);
            prompt.push('\n');
        }
        prompt.push_str("```\n");
        if !hunk.context_after.is_empty() {
            prompt.push_str("Context after:\n```\n");
            for line in &hunk.context_after {
                prompt.push_str(line);
                prompt.push('\n');
            }
            prompt.push_str("```\n");
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "Output contract:\n\
         - Respond with the clean resolved code for the conflicted region(s) only.\n\
         - No conflict markers.\n\
         - No code fencing.\n\
         - Valid syntax for the file's language.\n\
         - Preserve the surrounding indentation.\n\
         - Follow the resolved code with a brief explanation on a separate line prefixed `EXPLANATION:`.\n",
    );

    prompt
}

/// Append a prior validation failure to a prompt for a retry attempt.
#[must_use]
pub fn append_failure(prompt: &str, error: &str) -> String {
    format!(
        "{prompt}\nThe previous attempt was rejected: {error}\n\
         Produce a corrected resolution that addresses this rejection.\n"
    )
}
