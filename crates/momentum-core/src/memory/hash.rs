//! Context normalization and hashing for the decision cache.
//!
//! Two logically equivalent contexts must hash identically regardless of
//! ingestion order: volatile keys are dropped recursively and object keys
//! serialize sorted (the default `serde_json` map is ordered).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Keys dropped from contexts before hashing, matched case-insensitively.
const VOLATILE_KEYS: &[&str] = &["timestamp", "date", "time", "id", "uuid"];

fn is_volatile(key: &str) -> bool {
    VOLATILE_KEYS.iter().any(|v| key.eq_ignore_ascii_case(v))
}

/// Drop volatile keys recursively. Arrays preserve order; object keys are
/// sorted by the map representation.
#[must_use]
pub fn normalize_context(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !is_volatile(key))
                .map(|(key, val)| (key.clone(), normalize_context(val)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(normalize_context).collect()),
        other => other.clone(),
    }
}

/// SHA-256 digest (hex) of the normalized context plus the question.
#[must_use]
pub fn context_hash(context: &Value, question: &str) -> String {
    let normalized = normalize_context(context);
    let payload = serde_json::json!({
        "context": normalized,
        "question": question,
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Short deterministic identifier for content-addressed records.
#[must_use]
pub fn short_id(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest.chars().take(12).collect()
}
