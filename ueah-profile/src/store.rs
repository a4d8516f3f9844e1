//! The profile store service: every public operation runs a full
//! load, modify, sanitize, synchronize, persist cycle against the backend.
//!
//! No operation panics or surfaces storage failures. Reads that fail are
//! treated as "no data" and writes that fail are logged while the caller
//! still receives the in-memory result.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ProfileStorage;
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::constants::{
    KEY_EMAIL, KEY_IELS, KEY_LOCALE, KEY_NAME, KEY_NOTES, KEY_PROFILE, KEY_RESULTS_BY_AGE,
    KEY_TARGET_SCORE, PROFILE_TEXT_KEYS,
};
use crate::exchange::{
    ExportEnvelope, ExportedProfile, ImportError, ImportMode, ImportOptions, ImportReport,
};
use crate::migrate::{MigrationKind, default_document, migrate};
use crate::model::{IelsEntry, Profile, Skill, SkillEntry};
use crate::sanitize::{
    clean_age_group, clean_str, deep_merge, sanitize_iels_entry, sanitize_skill_entry,
    shape_profile,
};
use crate::scoring::{ScoringStrategy, sync_age_bucket_overall, sync_all_overalls};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Payload of the "profile changed" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileChanged {
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    /// Fire the change notification after a successful write.
    #[serde(default = "SaveOptions::default_dispatch")]
    pub dispatch: bool,
}

impl SaveOptions {
    const fn default_dispatch() -> bool {
        true
    }

    #[must_use]
    pub const fn silent() -> Self {
        Self { dispatch: false }
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            dispatch: Self::default_dispatch(),
        }
    }
}

/// Learner details accepted by [`ProfileStore::set_profile_info`]. Absent
/// fields are left as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub target_score: Option<String>,
}

impl ProfileInfo {
    fn into_patch(self) -> Map<String, Value> {
        [
            (KEY_NAME, self.name),
            (KEY_EMAIL, self.email),
            (KEY_LOCALE, self.locale),
            (KEY_NOTES, self.notes),
            (KEY_TARGET_SCORE, self.target_score),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.map(|v| (key.to_string(), Value::String(v))))
        .collect()
    }
}

type Listener = Box<dyn Fn(&ProfileChanged)>;

/// Whether `profile` would serialize to something other than `stored`.
fn differs_from_stored(profile: &Profile, stored: Option<&Value>) -> bool {
    let Some(stored) = stored else {
        return true;
    };
    !serde_json::to_value(profile).is_ok_and(|shaped| shaped == *stored)
}

/// Owner of the stored profile document.
pub struct ProfileStore<S: ProfileStorage> {
    storage: S,
    config: StoreConfig,
    scoring: Option<Box<dyn ScoringStrategy>>,
    clock: Box<dyn Clock>,
    listeners: Vec<Listener>,
}

impl<S: ProfileStorage> ProfileStore<S> {
    /// Create a store over `storage` with default configuration, the
    /// system clock and no scoring strategy.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: StoreConfig::default(),
            scoring: None,
            clock: Box::new(SystemClock),
            listeners: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_scoring(mut self, strategy: impl ScoringStrategy + 'static) -> Self {
        self.scoring = Some(Box::new(strategy));
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn set_scoring(&mut self, strategy: Option<Box<dyn ScoringStrategy>>) {
        self.scoring = strategy;
    }

    /// Register a listener for the "profile changed" notification.
    pub fn subscribe(&mut self, listener: impl Fn(&ProfileChanged) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    fn strategy(&self) -> Option<&dyn ScoringStrategy> {
        self.scoring.as_deref()
    }

    fn read_raw(&self) -> Result<Option<Value>, StoreError> {
        let Some(text) = self
            .storage
            .read(&self.config.storage_key)
            .map_err(|e| StoreError::Storage(e.to_string()))?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn write(&self, profile: &Profile) -> Result<(), StoreError> {
        let json = serde_json::to_string(profile)?;
        self.storage
            .write(&self.config.storage_key, &json)
            .map_err(|e| StoreError::Storage(e.to_string()))
    }

    fn persist(&self, profile: &Profile) -> bool {
        match self.write(profile) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("failed to persist profile: {err}");
                false
            }
        }
    }

    fn notify(&self, at: DateTime<Utc>) {
        let event = ProfileChanged { at };
        for listener in &self.listeners {
            listener(&event);
        }
    }

    /// Read, migrate, shape and sync the stored document. Returns whether
    /// the result differs from what storage holds.
    fn load_raw(&self) -> (Profile, MigrationKind, bool) {
        let now = self.clock.now();
        let raw = self.read_raw().unwrap_or_else(|err| {
            log::warn!("stored profile unreadable, starting fresh: {err}");
            None
        });
        let migration = migrate(raw.as_ref(), now);
        let mut profile = shape_profile(&migration.document, now, &self.config);
        let outcome = sync_all_overalls(&mut profile, self.strategy(), self.config.limits.label);
        let stale = migration.kind.needs_write_back()
            || outcome.is_dirty()
            || differs_from_stored(&profile, raw.as_ref());
        (profile, migration.kind, stale)
    }

    fn persist_if_changed(&self, profile: &Profile, changed: bool) -> bool {
        if !changed {
            return false;
        }
        log::debug!("repairing stored profile");
        self.persist(profile)
    }

    /// Run start-up migration: an absent, legacy or stale document is
    /// written back in the current shape without notifying listeners.
    pub fn bootstrap(&self) -> MigrationKind {
        let (profile, kind, stale) = self.load_raw();
        if self.persist_if_changed(&profile, stale) && kind.needs_write_back() {
            log::info!("profile document migrated ({kind:?}) to current schema");
        }
        kind
    }

    /// The current document, migrated, sanitized and with every overall
    /// in sync. Corrections, including timestamps filled in for entries
    /// that lacked one, are persisted silently so later loads agree.
    pub fn load(&self) -> Profile {
        let (profile, _, stale) = self.load_raw();
        self.persist_if_changed(&profile, stale);
        profile
    }

    pub fn get_profile(&self) -> Profile {
        self.load()
    }

    pub fn get(&self) -> Profile {
        self.load()
    }

    fn commit(&self, mut profile: Profile, opts: SaveOptions) -> Profile {
        profile.sanitize(&self.config);
        profile.updated_at = self.clock.now();
        sync_all_overalls(&mut profile, self.strategy(), self.config.limits.label);
        if self.persist(&profile) && opts.dispatch {
            self.notify(profile.updated_at);
        }
        profile
    }

    /// Replace the stored document with `data`, which may be partial or
    /// in an older shape. Non-object input leaves the store untouched.
    pub fn save(&self, data: &Value, opts: SaveOptions) -> Profile {
        if !data.is_object() {
            log::debug!("ignoring save of non-object profile data");
            return self.load();
        }
        let now = self.clock.now();
        let migration = migrate(Some(data), now);
        let profile = shape_profile(&migration.document, now, &self.config);
        self.commit(profile, opts)
    }

    pub fn set(&self, data: &Value) -> Profile {
        self.save(data, SaveOptions::default())
    }

    /// Save an already typed document through the same pipeline.
    pub fn save_profile(&self, profile: &Profile, opts: SaveOptions) -> Profile {
        self.commit(profile.clone(), opts)
    }

    /// Deep-merge `patch` onto the current document and save it.
    pub fn update(&self, patch: &Value) -> Profile {
        let current = self.load();
        if !patch.is_object() {
            log::debug!("ignoring non-object profile patch");
            return current;
        }
        let mut document = match serde_json::to_value(&current) {
            Ok(document) => document,
            Err(err) => {
                log::warn!("failed to serialize profile for update: {err}");
                return current;
            }
        };
        deep_merge(&mut document, patch);
        self.save(&document, SaveOptions::default())
    }

    /// Remove the stored document; the next load starts from defaults.
    pub fn clear(&self) {
        match self.storage.remove(&self.config.storage_key) {
            Ok(()) => self.notify(self.clock.now()),
            Err(err) => log::warn!("failed to clear profile: {err}"),
        }
    }

    pub fn set_profile_info(&self, info: ProfileInfo) -> Profile {
        let patch = info.into_patch();
        if patch.is_empty() {
            return self.load();
        }
        self.update(&Value::Object(patch))
    }

    /// Record a composite score. Entries without an overall band are ignored.
    pub fn add_iels_score(&self, entry: &Value) -> Profile {
        let mut profile = self.load();
        let Some(entry) = sanitize_iels_entry(entry, self.clock.now()) else {
            log::debug!("ignoring composite score without overall band");
            return profile;
        };
        profile.iels.record(entry, self.config.history_limit);
        self.commit(profile, SaveOptions::default())
    }

    pub fn get_iels_history(&self) -> Vec<IelsEntry> {
        self.load().iels.history
    }

    /// Record one quiz run for one skill of an age group and resync that
    /// group's overall. A run repeating the current latest result adds no
    /// history row.
    pub fn add_age_skill_score(&self, age_group: &str, skill: &str, entry: &Value) -> Profile {
        let mut profile = self.load();
        let Some(skill) = Skill::from_name(skill) else {
            log::debug!("ignoring score for unknown skill {skill:?}");
            return profile;
        };
        let limits = &self.config.limits;
        let Some(age_group) = clean_age_group(age_group, limits.age_group) else {
            log::debug!("ignoring {skill} score without age group");
            return profile;
        };
        let Some(mut sanitized) = sanitize_skill_entry(entry, skill, self.clock.now(), limits)
        else {
            log::debug!("ignoring {skill} entry without usable score");
            return profile;
        };
        self.fill_level(&age_group, &mut sanitized, entry);

        let bucket = profile.results_by_age.entry(age_group.clone()).or_default();
        let recorded = bucket
            .skill_mut(skill)
            .record(sanitized, self.config.history_limit);
        let outcome = sync_age_bucket_overall(&age_group, bucket, self.strategy(), limits.label);
        if !recorded {
            log::debug!("duplicate {skill} result for age group {age_group}");
            if !outcome.is_dirty() {
                return profile;
            }
        }
        self.commit(profile, SaveOptions::default())
    }

    fn fill_level(&self, age_group: &str, entry: &mut SkillEntry, extra: &Value) {
        if entry.level.is_some() || !entry.level_title.is_empty() {
            return;
        }
        let Some(strategy) = self.strategy() else {
            return;
        };
        match strategy.derive_level(age_group, &entry.slug, entry.score, extra) {
            Ok(Some(info)) => {
                entry.level = info.level;
                entry.level_title = clean_str(&info.title, self.config.limits.label);
            }
            Ok(None) => {}
            Err(err) => log::warn!("level derivation for {} failed: {err}", entry.slug),
        }
    }

    /// Drop one age group's results, or all of them when `age_group` is `None`.
    pub fn clear_age_results(&self, age_group: Option<&str>) -> Profile {
        let mut profile = self.load();
        match age_group {
            Some(raw) => {
                let removed = clean_age_group(raw, self.config.limits.age_group)
                    .and_then(|key| profile.results_by_age.remove(&key));
                if removed.is_none() {
                    return profile;
                }
            }
            None => {
                if profile.results_by_age.is_empty() {
                    return profile;
                }
                profile.results_by_age.clear();
            }
        }
        self.commit(profile, SaveOptions::default())
    }

    pub fn export_data(&self) -> ExportEnvelope {
        let profile = self.load();
        ExportEnvelope {
            schema_version: profile.schema_version,
            updated_at: profile.updated_at,
            profile: ExportedProfile::from(&profile),
        }
    }

    /// Import a wrapped export or a bare profile object.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is not an object or its `profile`
    /// field is present but not an object. Nothing is written in that case.
    pub fn import_data(
        &self,
        payload: &Value,
        opts: ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let obj = payload.as_object().ok_or(ImportError::NotAnObject)?;
        let body = match obj.get(KEY_PROFILE) {
            Some(Value::Object(inner)) => inner,
            Some(Value::Null) | None => obj,
            Some(_) => return Err(ImportError::InvalidProfile),
        };
        let fields: Map<String, Value> = PROFILE_TEXT_KEYS
            .into_iter()
            .chain([KEY_IELS, KEY_RESULTS_BY_AGE])
            .filter_map(|key| body.get(key).map(|v| (key.to_string(), v.clone())))
            .collect();

        let mut base = match opts.mode {
            ImportMode::Replace => default_document(self.clock.now()),
            ImportMode::Merge => serde_json::to_value(self.load())
                .map_err(|e| ImportError::Serialization(e.to_string()))?,
        };
        deep_merge(&mut base, &Value::Object(fields));
        let profile = self.save(&base, SaveOptions::default());
        log::info!("imported profile ({:?})", opts.mode);
        Ok(ImportReport {
            mode: opts.mode,
            updated_at: profile.updated_at,
        })
    }

    /// [`Self::import_data`] for a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ImportError::InvalidJson`] if `payload` does not parse, or
    /// any error [`Self::import_data`] returns.
    pub fn import_json(
        &self,
        payload: &str,
        opts: ImportOptions,
    ) -> Result<ImportReport, ImportError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| ImportError::InvalidJson(e.to_string()))?;
        self.import_data(&value, opts)
    }
}
