//! UEAH Profile Store
//!
//! Platform-agnostic persistence for the learner profile shared by every
//! quiz runner: a versioned JSON document holding learner details, a flat
//! composite score history and per-age-group skill results with a derived
//! overall score. This crate has no browser dependencies; hosts provide a
//! [`ProfileStorage`] backend.

pub mod clock;
pub mod config;
pub mod constants;
pub mod exchange;
pub mod migrate;
pub mod model;
pub mod numbers;
pub mod sanitize;
pub mod scoring;
pub mod store;

use std::cell::RefCell;
use std::collections::HashMap;
use std::convert::Infallible;
use std::rc::Rc;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, FieldLimits, StoreConfig};
pub use exchange::{
    ExportEnvelope, ExportedProfile, ImportError, ImportMode, ImportOptions, ImportOutcome,
    ImportReport,
};
pub use migrate::{Migration, MigrationKind, default_document, migrate};
pub use model::{
    AgeBucket, IelsBlock, IelsEntry, OverallEntry, Profile, Skill, SkillBucket, SkillEntry,
};
pub use scoring::{
    Band, BandScoring, LevelInfo, OverallVerdict, ScoringError, ScoringStrategy, SkillScores,
    SyncOutcome, compute_overall_snapshot, level_from_value, sync_age_bucket_overall,
    sync_all_overalls, verdict_from_value,
};
pub use store::{ProfileChanged, ProfileInfo, ProfileStore, SaveOptions, StoreError};

/// Trait for abstracting the key-value slot the profile lives in.
/// Platform-specific implementations should provide this
pub trait ProfileStorage {
    type Error: std::error::Error + 'static;

    /// Read the raw value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read(&self, key: &str) -> Result<Option<String>, Self::Error>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the write (quota, disabled).
    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error>;

    /// Remove `key` entirely.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be modified.
    fn remove(&self, key: &str) -> Result<(), Self::Error>;
}

/// In-memory backend. Clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a slot directly, bypassing the store.
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.slots
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.slots.borrow().get(key).cloned()
    }
}

impl ProfileStorage for MemoryStorage {
    type Error = Infallible;

    fn read(&self, key: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), Self::Error> {
        self.insert_raw(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Self::Error> {
        self.slots.borrow_mut().remove(key);
        Ok(())
    }
}
