//! Schema migrations and repair for the memory envelope.
//!
//! Migrations are numbered functions applied in order against the raw JSON
//! document; a migration that cannot apply aborts with an explicit error.
//! Repair is a separate, explicit operation that may discard malformed
//! records.

use serde_json::{Map, Value};

use super::records::{MemoryEnvelope, SCHEMA_VERSION};
use crate::error::{Error, Result};

const COLLECTIONS: &[&str] = &["patterns", "decisions", "executions", "files"];

/// Primary field per collection; records missing it are dropped by repair.
fn primary_field(collection: &str) -> &'static str {
    match collection {
        "patterns" => "pattern",
        "decisions" => "context_hash",
        "executions" => "plan_path",
        _ => "path",
    }
}

type Migration = fn(&mut Map<String, Value>) -> Result<()>;

/// v1: every collection exists as an array.
fn migrate_v1(root: &mut Map<String, Value>) -> Result<()> {
    for collection in COLLECTIONS {
        match root.get(*collection) {
            None => {
                root.insert((*collection).to_string(), Value::Array(Vec::new()));
            }
            Some(Value::Array(_)) => {}
            Some(other) => {
                return Err(Error::Migration {
                    version: 1,
                    reason: format!(
                        "collection '{collection}' is {other_kind}, expected an array",
                        other_kind = json_kind(other)
                    ),
                });
            }
        }
    }
    Ok(())
}

/// v2: patterns gained `created_at`; backfill from `last_seen`.
fn migrate_v2(root: &mut Map<String, Value>) -> Result<()> {
    let Some(Value::Array(patterns)) = root.get_mut("patterns") else {
        return Err(Error::Migration {
            version: 2,
            reason: "patterns collection missing after v1".to_string(),
        });
    };
    for pattern in patterns {
        let Some(object) = pattern.as_object_mut() else {
            return Err(Error::Migration {
                version: 2,
                reason: "pattern record is not an object".to_string(),
            });
        };
        if !object.contains_key("created_at") {
            let last_seen = object.get("last_seen").cloned().ok_or_else(|| {
                Error::Migration {
                    version: 2,
                    reason: "pattern record has neither created_at nor last_seen".to_string(),
                }
            })?;
            object.insert("created_at".to_string(), last_seen);
        }
    }
    Ok(())
}

const MIGRATIONS: &[(u32, Migration)] = &[(1, migrate_v1), (2, migrate_v2)];

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Bring a raw envelope document to the current schema and deserialize it.
///
/// # Errors
///
/// - `Error::Migration` when a numbered migration cannot apply.
/// - `Error::Validation` when the migrated document still fails to
///   deserialize.
pub fn migrate(value: Value) -> Result<MemoryEnvelope> {
    let Value::Object(mut root) = value else {
        return Err(Error::Migration {
            version: SCHEMA_VERSION,
            reason: "memory document is not a JSON object".to_string(),
        });
    };

    let current = root
        .get("version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .unwrap_or(0);

    for (version, apply) in MIGRATIONS {
        if *version > current {
            apply(&mut root)?;
            tracing::debug!("applied memory migration v{version}");
        }
    }
    root.insert(
        "version".to_string(),
        Value::Number(SCHEMA_VERSION.into()),
    );

    serde_json::from_value(Value::Object(root))
        .map_err(|e| Error::Validation(format!("migrated envelope fails to deserialize: {e}")))
}

/// Counts of what repair changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepairReport {
    /// Collections that were missing and got materialized.
    pub collections_added: usize,
    /// Records dropped for missing `id` or the collection's primary field.
    pub records_dropped: usize,
    /// Whether a missing version was set.
    pub version_set: bool,
}

/// Repair a possibly-damaged envelope document.
///
/// Materializes missing collections, sets a missing version, and drops
/// records lacking `id` or their collection's primary field.
///
/// # Errors
///
/// Returns `Error::Validation` when the document is not an object or the
/// repaired document still fails to deserialize.
pub fn repair(value: Value) -> Result<(MemoryEnvelope, RepairReport)> {
    let Value::Object(mut root) = value else {
        return Err(Error::Validation(
            "memory document is not a JSON object".to_string(),
        ));
    };

    let mut report = RepairReport::default();

    // A missing version is pinned to 0 so every migration re-runs below.
    if !root.get("version").is_some_and(Value::is_u64) {
        root.insert("version".to_string(), Value::Number(0.into()));
        report.version_set = true;
    }

    for collection in COLLECTIONS {
        let primary = primary_field(collection);
        match root.get_mut(*collection) {
            Some(Value::Array(records)) => {
                let before = records.len();
                records.retain(|record| {
                    record.as_object().is_some_and(|object| {
                        object.get("id").is_some_and(Value::is_string)
                            && object.get(primary).is_some()
                    })
                });
                report.records_dropped += before - records.len();
            }
            _ => {
                root.insert((*collection).to_string(), Value::Array(Vec::new()));
                report.collections_added += 1;
            }
        }
    }

    let envelope = migrate(Value::Object(root))?;
    Ok((envelope, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_migrate_empty_object_to_current() {
        let envelope = migrate(json!({})).unwrap_or_else(|e| panic!("migrate failed: {e}"));
        assert_eq!(envelope.version, SCHEMA_VERSION);
        assert!(envelope.patterns.is_empty());
    }

    #[test]
    fn test_migrate_backfills_created_at() {
        let doc = json!({
            "version": 1,
            "patterns": [{
                "id": "pat-1",
                "kind": "commit-pattern",
                "pattern": "feat",
                "frequency": 2,
                "last_seen": "2026-01-01T00:00:00Z",
            }],
            "decisions": [],
            "executions": [],
            "files": [],
        });
        let envelope = migrate(doc).unwrap_or_else(|e| panic!("migrate failed: {e}"));
        assert_eq!(envelope.patterns[0].created_at, envelope.patterns[0].last_seen);
    }

    #[test]
    fn test_migration_aborts_on_non_array_collection() {
        let doc = json!({"patterns": "corrupt"});
        assert!(matches!(migrate(doc), Err(Error::Migration { version: 1, .. })));
    }

    #[test]
    fn test_repair_drops_malformed_records() {
        let doc = json!({
            "patterns": [
                {"id": "pat-1", "kind": "commit-pattern", "pattern": "feat",
                 "frequency": 1, "last_seen": "2026-01-01T00:00:00Z"},
                {"kind": "commit-pattern", "pattern": "no id"},
                {"id": "pat-3"},
            ],
        });
        let (envelope, report) = repair(doc).unwrap_or_else(|e| panic!("repair failed: {e}"));
        assert_eq!(envelope.patterns.len(), 1);
        assert_eq!(report.records_dropped, 2);
        assert_eq!(report.collections_added, 3);
        assert!(report.version_set);
    }
}
