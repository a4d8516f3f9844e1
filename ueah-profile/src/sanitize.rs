//! Boundary between untyped JSON (storage, caller patches, imports) and
//! the typed profile records.
//!
//! Every function here is total: malformed input degrades toward empty
//! values or is dropped, never surfaced as an error.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::{FieldLimits, StoreConfig};
use crate::constants::{
    KEY_EMAIL, KEY_IELS, KEY_LOCALE, KEY_NAME, KEY_NOTES, KEY_RESULTS_BY_AGE, KEY_TARGET_SCORE,
    KEY_UPDATED_AT,
};
use crate::model::{
    AgeBucket, IelsBlock, IelsEntry, OverallEntry, Profile, Skill, SkillBucket, SkillEntry,
};
use crate::numbers::{clamp_score, number_or_null};

/// Trim and truncate to at most `max_chars` characters.
#[must_use]
pub fn clean_str(raw: &str, max_chars: usize) -> String {
    raw.trim().chars().take(max_chars).collect::<String>().trim_end().to_string()
}

/// Coerce a scalar into bounded text. Containers and `null` become empty.
#[must_use]
pub fn clean_text(value: Option<&Value>, max_chars: usize) -> String {
    match value {
        Some(Value::String(s)) => clean_str(s, max_chars),
        Some(Value::Number(n)) => clean_str(&n.to_string(), max_chars),
        Some(Value::Bool(b)) => clean_str(&b.to_string(), max_chars),
        _ => String::new(),
    }
}

#[must_use]
pub fn clean_email(value: Option<&Value>, max_chars: usize) -> String {
    clean_text(value, max_chars).to_lowercase()
}

/// Normalize an age-group key; blank keys are rejected.
#[must_use]
pub fn clean_age_group(raw: &str, max_chars: usize) -> Option<String> {
    let key = clean_str(raw, max_chars);
    (!key.is_empty()).then_some(key)
}

/// Accept RFC 3339 strings or epoch milliseconds.
#[must_use]
pub fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Recursively merge `patch` into `base`. Objects merge key by key; any
/// other value replaces what was there.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                if let Some(existing) = base_map.get_mut(key)
                    && existing.is_object()
                    && patch_value.is_object()
                {
                    deep_merge(existing, patch_value);
                    continue;
                }
                base_map.insert(key.clone(), patch_value.clone());
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

/// Copy from `source` only the keys that exist in `template`.
#[must_use]
pub fn pick_known_keys(template: &Value, source: &Value) -> Map<String, Value> {
    let (Some(template), Some(source)) = (template.as_object(), source.as_object()) else {
        return Map::new();
    };
    source
        .iter()
        .filter(|(key, _)| template.contains_key(*key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Shape a raw skill entry. Runner payloads may carry `percent` and
/// `totalQuestions` in place of `score` and `rawTotal`.
#[must_use]
pub fn sanitize_skill_entry(
    value: &Value,
    skill: Skill,
    fallback_at: DateTime<Utc>,
    limits: &FieldLimits,
) -> Option<SkillEntry> {
    let obj = value.as_object()?;
    let score = number_or_null(obj.get("score"))
        .or_else(|| number_or_null(obj.get("percent")))?;
    Some(SkillEntry {
        score: clamp_score(score),
        raw_correct: number_or_null(obj.get("rawCorrect")),
        raw_total: number_or_null(obj.get("rawTotal"))
            .or_else(|| number_or_null(obj.get("totalQuestions"))),
        level_title: clean_text(obj.get("levelTitle"), limits.label),
        level: number_or_null(obj.get("level")),
        breakdown: obj.get("breakdown").filter(|v| !v.is_null()).cloned(),
        slug: clean_text(obj.get("slug"), limits.label),
        skill,
        at: parse_timestamp(obj.get("at")).unwrap_or(fallback_at),
    })
}

#[must_use]
pub fn sanitize_overall_entry(
    value: &Value,
    fallback_at: DateTime<Utc>,
    limits: &FieldLimits,
) -> Option<OverallEntry> {
    let obj = value.as_object()?;
    let score = number_or_null(obj.get("score"))?;
    Some(OverallEntry {
        score: clamp_score(score),
        title: clean_text(obj.get("title"), limits.label),
        level: number_or_null(obj.get("level")),
        at: parse_timestamp(obj.get("at")).unwrap_or(fallback_at),
    })
}

/// Shape a composite score entry; one without an `overall` band is dropped.
#[must_use]
pub fn sanitize_iels_entry(value: &Value, fallback_at: DateTime<Utc>) -> Option<IelsEntry> {
    let obj = value.as_object()?;
    let overall = number_or_null(obj.get("overall"))?;
    Some(IelsEntry {
        overall: Some(overall),
        reading: number_or_null(obj.get("reading")),
        listening: number_or_null(obj.get("listening")),
        speaking: number_or_null(obj.get("speaking")),
        writing: number_or_null(obj.get("writing")),
        at: parse_timestamp(obj.get("at")).unwrap_or(fallback_at),
    })
}

fn sanitize_history<T>(
    value: Option<&Value>,
    limit: usize,
    shape: impl Fn(&Value) -> Option<T>,
) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(shape).take(limit).collect())
        .unwrap_or_default()
}

#[must_use]
pub fn sanitize_skill_bucket(
    value: Option<&Value>,
    skill: Skill,
    now: DateTime<Utc>,
    config: &StoreConfig,
) -> SkillBucket {
    let Some(obj) = value.and_then(Value::as_object) else {
        return SkillBucket::default();
    };
    let shape = |entry: &Value| sanitize_skill_entry(entry, skill, now, &config.limits);
    SkillBucket {
        last_score: obj.get("lastScore").and_then(shape),
        history: sanitize_history(obj.get("history"), config.history_limit, shape),
    }
}

#[must_use]
pub fn sanitize_age_bucket(value: &Value, now: DateTime<Utc>, config: &StoreConfig) -> AgeBucket {
    let obj = value.as_object();
    let field = |key: &str| obj.and_then(|o| o.get(key));
    AgeBucket {
        reading: sanitize_skill_bucket(field("reading"), Skill::Reading, now, config),
        listening: sanitize_skill_bucket(field("listening"), Skill::Listening, now, config),
        writing: sanitize_skill_bucket(field("writing"), Skill::Writing, now, config),
        speaking: sanitize_skill_bucket(field("speaking"), Skill::Speaking, now, config),
        overall: field("overall")
            .and_then(|overall| sanitize_overall_entry(overall, now, &config.limits)),
    }
}

#[must_use]
pub fn sanitize_results_by_age(
    value: Option<&Value>,
    now: DateTime<Utc>,
    config: &StoreConfig,
) -> BTreeMap<String, AgeBucket> {
    let mut results = BTreeMap::new();
    let Some(obj) = value.and_then(Value::as_object) else {
        return results;
    };
    for (key, bucket) in obj {
        if !bucket.is_object() {
            continue;
        }
        let Some(key) = clean_age_group(key, config.limits.age_group) else {
            continue;
        };
        results
            .entry(key)
            .or_insert_with(|| sanitize_age_bucket(bucket, now, config));
    }
    results
}

#[must_use]
pub fn sanitize_iels_block(
    value: Option<&Value>,
    now: DateTime<Utc>,
    config: &StoreConfig,
) -> IelsBlock {
    let Some(obj) = value.and_then(Value::as_object) else {
        return IelsBlock::default();
    };
    let shape = |entry: &Value| sanitize_iels_entry(entry, now);
    IelsBlock {
        last_score: obj.get("lastScore").and_then(shape),
        history: sanitize_history(obj.get("history"), config.history_limit, shape),
    }
}

/// Shape a whole document. Only recognized root keys are read; anything
/// missing falls back to the default document's value.
#[must_use]
pub fn shape_profile(value: &Value, now: DateTime<Utc>, config: &StoreConfig) -> Profile {
    let mut profile = Profile::new(now);
    let Some(obj) = value.as_object() else {
        return profile;
    };
    let limits = &config.limits;
    if let Some(updated_at) = parse_timestamp(obj.get(KEY_UPDATED_AT)) {
        profile.updated_at = updated_at;
    }
    profile.name = clean_text(obj.get(KEY_NAME), limits.name);
    profile.email = clean_email(obj.get(KEY_EMAIL), limits.email);
    profile.target_score = clean_text(obj.get(KEY_TARGET_SCORE), limits.target_score);
    profile.locale = clean_text(obj.get(KEY_LOCALE), limits.locale);
    profile.notes = clean_text(obj.get(KEY_NOTES), limits.notes);
    profile.iels = sanitize_iels_block(obj.get(KEY_IELS), now, config);
    profile.results_by_age = sanitize_results_by_age(obj.get(KEY_RESULTS_BY_AGE), now, config);
    profile
}
