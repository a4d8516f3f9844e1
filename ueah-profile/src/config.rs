//! Store configuration: storage key, history cap and text bounds.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants;

/// Errors raised when store configuration invariants are violated.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("JSON parse error: {0}")]
    Parse(String),
    #[error("storage key must not be empty")]
    EmptyStorageKey,
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: usize,
        value: usize,
    },
}

/// Maximum lengths, in characters, for every bounded text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLimits {
    #[serde(default = "FieldLimits::default_name")]
    pub name: usize,
    #[serde(default = "FieldLimits::default_email")]
    pub email: usize,
    #[serde(default = "FieldLimits::default_target_score")]
    pub target_score: usize,
    #[serde(default = "FieldLimits::default_locale")]
    pub locale: usize,
    #[serde(default = "FieldLimits::default_notes")]
    pub notes: usize,
    /// Slugs, level titles and overall titles.
    #[serde(default = "FieldLimits::default_label")]
    pub label: usize,
    #[serde(default = "FieldLimits::default_age_group")]
    pub age_group: usize,
}

impl FieldLimits {
    const fn default_name() -> usize {
        constants::NAME_MAX
    }

    const fn default_email() -> usize {
        constants::EMAIL_MAX
    }

    const fn default_target_score() -> usize {
        constants::TARGET_SCORE_MAX
    }

    const fn default_locale() -> usize {
        constants::LOCALE_MAX
    }

    const fn default_notes() -> usize {
        constants::NOTES_MAX
    }

    const fn default_label() -> usize {
        constants::LABEL_MAX
    }

    const fn default_age_group() -> usize {
        constants::AGE_GROUP_MAX
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("limits.name", self.name),
            ("limits.email", self.email),
            ("limits.target_score", self.target_score),
            ("limits.locale", self.locale),
            ("limits.notes", self.notes),
            ("limits.label", self.label),
            ("limits.age_group", self.age_group),
        ];
        for (field, value) in fields {
            if value == 0 {
                return Err(ConfigError::MinViolation {
                    field,
                    min: 1,
                    value,
                });
            }
        }
        Ok(())
    }
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self {
            name: Self::default_name(),
            email: Self::default_email(),
            target_score: Self::default_target_score(),
            locale: Self::default_locale(),
            notes: Self::default_notes(),
            label: Self::default_label(),
            age_group: Self::default_age_group(),
        }
    }
}

/// Top-level configuration for a [`crate::ProfileStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "StoreConfig::default_storage_key")]
    pub storage_key: String,
    /// Maximum retained entries per history list, newest first.
    #[serde(default = "StoreConfig::default_history_limit")]
    pub history_limit: usize,
    #[serde(default)]
    pub limits: FieldLimits,
}

impl StoreConfig {
    fn default_storage_key() -> String {
        constants::STORAGE_KEY.to_string()
    }

    const fn default_history_limit() -> usize {
        constants::HISTORY_LIMIT
    }

    /// Parse configuration from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is out of range.
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every bound is usable.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::EmptyStorageKey);
        }
        if self.history_limit == 0 {
            return Err(ConfigError::MinViolation {
                field: "history_limit",
                min: 1,
                value: self.history_limit,
            });
        }
        self.limits.validate()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: Self::default_storage_key(),
            history_limit: Self::default_history_limit(),
            limits: FieldLimits::default(),
        }
    }
}
