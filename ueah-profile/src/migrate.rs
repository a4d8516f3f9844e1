//! Schema migration: turn whatever was read from storage into a document
//! of the current version before it is shaped into a [`crate::Profile`].
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::constants::{
    KEY_IELS, KEY_RESULTS_BY_AGE, KEY_SCHEMA_VERSION, KEY_UPDATED_AT, LEGACY_MARKERS,
    PROFILE_TEXT_KEYS, SCHEMA_VERSION,
};
use crate::numbers::number_or_null;
use crate::sanitize::pick_known_keys;

/// Which path a raw document took through [`migrate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigrationKind {
    /// Nothing usable was stored; a default document was created.
    Fresh,
    /// A pre-versioning document, recognized by its learner fields.
    Legacy,
    /// A versioned document from another schema version.
    Upgraded,
    /// Already at the current version.
    Current,
}

impl MigrationKind {
    /// Whether the migrated document differs in shape from what is stored.
    #[must_use]
    pub const fn needs_write_back(self) -> bool {
        !matches!(self, Self::Current)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Migration {
    pub document: Value,
    pub kind: MigrationKind,
}

/// The default document as raw JSON, used as the merge template.
#[must_use]
pub fn default_document(now: DateTime<Utc>) -> Value {
    json!({
        KEY_SCHEMA_VERSION: SCHEMA_VERSION,
        KEY_UPDATED_AT: now.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        "name": "",
        "email": "",
        "targetScore": "",
        "locale": "",
        "notes": "",
        KEY_IELS: { "lastScore": null, "history": [] },
        KEY_RESULTS_BY_AGE: {},
    })
}

fn stored_version(raw: &Map<String, Value>) -> Option<f64> {
    number_or_null(raw.get(KEY_SCHEMA_VERSION))
}

fn is_legacy(raw: &Map<String, Value>) -> bool {
    raw.get(KEY_SCHEMA_VERSION).is_none_or(Value::is_null)
        && LEGACY_MARKERS.iter().any(|key| raw.contains_key(*key))
}

fn copy_keys<'a>(
    target: &mut Value,
    raw: &Map<String, Value>,
    keys: impl IntoIterator<Item = &'a str>,
) {
    let Some(target) = target.as_object_mut() else {
        return;
    };
    for key in keys {
        if let Some(value) = raw.get(key) {
            target.insert(key.to_string(), value.clone());
        }
    }
}

/// Migrate a raw stored value. Pure and total: malformed input degrades to
/// the default document.
#[must_use]
pub fn migrate(raw: Option<&Value>, now: DateTime<Utc>) -> Migration {
    let Some(raw) = raw.and_then(Value::as_object) else {
        return Migration {
            document: default_document(now),
            kind: MigrationKind::Fresh,
        };
    };

    if is_legacy(raw) {
        let mut document = default_document(now);
        copy_keys(&mut document, raw, PROFILE_TEXT_KEYS);
        copy_keys(&mut document, raw, [KEY_IELS, KEY_RESULTS_BY_AGE]);
        log::debug!("migrating pre-versioning profile document");
        return Migration {
            document,
            kind: MigrationKind::Legacy,
        };
    }

    let version = stored_version(raw);
    if version == Some(f64::from(SCHEMA_VERSION)) {
        return Migration {
            document: Value::Object(raw.clone()),
            kind: MigrationKind::Current,
        };
    }

    let mut document = default_document(now);
    let known = pick_known_keys(&document, &Value::Object(raw.clone()));
    if let Some(target) = document.as_object_mut() {
        target.extend(known);
        target.insert(KEY_SCHEMA_VERSION.to_string(), json!(SCHEMA_VERSION));
    }
    log::debug!(
        "upgrading profile document from schema version {version:?} to {SCHEMA_VERSION}"
    );
    Migration {
        document,
        kind: MigrationKind::Upgraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap()
    }

    #[test]
    fn missing_or_non_object_is_fresh() {
        assert_eq!(migrate(None, now()).kind, MigrationKind::Fresh);
        assert_eq!(migrate(Some(&json!([1, 2])), now()).kind, MigrationKind::Fresh);
        let fresh = migrate(Some(&json!("profile")), now());
        assert_eq!(fresh.document, default_document(now()));
        assert!(fresh.kind.needs_write_back());
    }

    #[test]
    fn legacy_document_keeps_learner_fields_and_blocks() {
        let raw = json!({
            "email": "A@B.com",
            "name": "X",
            "favouriteColour": "green",
            "resultsByAge": {"4-7": {}}
        });
        let migration = migrate(Some(&raw), now());
        assert_eq!(migration.kind, MigrationKind::Legacy);
        let doc = migration.document;
        assert_eq!(doc["schemaVersion"], json!(2));
        assert_eq!(doc["email"], json!("A@B.com"));
        assert_eq!(doc["name"], json!("X"));
        assert_eq!(doc["resultsByAge"], json!({"4-7": {}}));
        assert!(doc.get("favouriteColour").is_none());
    }

    #[test]
    fn stale_version_is_merged_onto_defaults() {
        let raw = json!({
            "schemaVersion": 1,
            "name": "Old",
            "removedField": 3,
            "iels": {"history": [{"overall": 7}]}
        });
        let migration = migrate(Some(&raw), now());
        assert_eq!(migration.kind, MigrationKind::Upgraded);
        let doc = migration.document;
        assert_eq!(doc["schemaVersion"], json!(2));
        assert_eq!(doc["name"], json!("Old"));
        assert_eq!(doc["notes"], json!(""));
        assert_eq!(doc["iels"]["history"][0]["overall"], json!(7));
        assert!(doc.get("removedField").is_none());
    }

    #[test]
    fn unversioned_without_markers_is_upgraded() {
        let migration = migrate(Some(&json!({"locale": "vi"})), now());
        assert_eq!(migration.kind, MigrationKind::Upgraded);
        assert_eq!(migration.document["locale"], json!("vi"));
    }

    #[test]
    fn current_version_passes_through() {
        let raw = json!({"schemaVersion": 2, "name": "  untouched  "});
        let migration = migrate(Some(&raw), now());
        assert_eq!(migration.kind, MigrationKind::Current);
        assert_eq!(migration.document, raw);
        assert!(!migration.kind.needs_write_back());
    }
}
