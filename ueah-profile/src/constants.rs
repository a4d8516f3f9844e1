//! Centralized schema and bounds constants for the profile document.
//!
//! Field limits here are the defaults for [`crate::config::FieldLimits`];
//! hosts may tighten or relax them through configuration, but the schema
//! version and storage key only change alongside a migration.

// Schema -------------------------------------------------------------------
pub const SCHEMA_VERSION: u32 = 2;
pub const STORAGE_KEY: &str = "UEAH_PROFILE_V1";

// History ------------------------------------------------------------------
pub const HISTORY_LIMIT: usize = 50;

// Scores -------------------------------------------------------------------
pub const SCORE_MIN: u8 = 0;
pub const SCORE_MAX: u8 = 100;

// Text bounds (chars) ------------------------------------------------------
pub const NAME_MAX: usize = 80;
pub const EMAIL_MAX: usize = 120;
pub const TARGET_SCORE_MAX: usize = 40;
pub const LOCALE_MAX: usize = 40;
pub const NOTES_MAX: usize = 2000;
pub const LABEL_MAX: usize = 120;
pub const AGE_GROUP_MAX: usize = 40;

// Document keys ------------------------------------------------------------
pub(crate) const KEY_SCHEMA_VERSION: &str = "schemaVersion";
pub(crate) const KEY_UPDATED_AT: &str = "updatedAt";
pub(crate) const KEY_NAME: &str = "name";
pub(crate) const KEY_EMAIL: &str = "email";
pub(crate) const KEY_TARGET_SCORE: &str = "targetScore";
pub(crate) const KEY_LOCALE: &str = "locale";
pub(crate) const KEY_NOTES: &str = "notes";
pub(crate) const KEY_IELS: &str = "iels";
pub(crate) const KEY_RESULTS_BY_AGE: &str = "resultsByAge";
pub(crate) const KEY_PROFILE: &str = "profile";

/// Root fields a pre-versioning document is recognized by.
pub(crate) const LEGACY_MARKERS: [&str; 3] = [KEY_EMAIL, KEY_NAME, KEY_TARGET_SCORE];

/// Text fields carried across every migration path.
pub(crate) const PROFILE_TEXT_KEYS: [&str; 5] = [
    KEY_NAME,
    KEY_EMAIL,
    KEY_TARGET_SCORE,
    KEY_LOCALE,
    KEY_NOTES,
];

// Browser integration ------------------------------------------------------
pub const PROFILE_CHANGED_EVENT: &str = "ueah:profile-changed";
pub const SCORING_GLOBAL: &str = "UEAH_SCORING";
