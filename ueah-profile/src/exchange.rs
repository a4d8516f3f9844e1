//! Export/import envelopes for moving a profile between devices.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AgeBucket, IelsBlock, Profile};

/// The portable subset of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedProfile {
    pub name: String,
    pub email: String,
    pub target_score: String,
    pub locale: String,
    pub notes: String,
    pub iels: IelsBlock,
    pub results_by_age: BTreeMap<String, AgeBucket>,
}

impl From<&Profile> for ExportedProfile {
    fn from(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            email: profile.email.clone(),
            target_score: profile.target_score.clone(),
            locale: profile.locale.clone(),
            notes: profile.notes.clone(),
            iels: profile.iels.clone(),
            results_by_age: profile.results_by_age.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    pub profile: ExportedProfile,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    /// Merge the payload onto the stored profile.
    #[default]
    Merge,
    /// Start from an empty profile.
    Replace,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub mode: ImportMode,
}

impl ImportOptions {
    #[must_use]
    pub const fn replace() -> Self {
        Self {
            mode: ImportMode::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportReport {
    pub mode: ImportMode,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("payload is not an object")]
    NotAnObject,
    #[error("payload profile is not an object")]
    InvalidProfile,
    #[error("current profile could not be serialized: {0}")]
    Serialization(String),
}

/// JSON-facing projection of an import result: `{ok, mode?, updatedAt?, reason?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ImportMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<Result<ImportReport, ImportError>> for ImportOutcome {
    fn from(result: Result<ImportReport, ImportError>) -> Self {
        match result {
            Ok(report) => Self {
                ok: true,
                mode: Some(report.mode),
                updated_at: Some(report.updated_at),
                reason: None,
            },
            Err(err) => Self {
                ok: false,
                mode: None,
                updated_at: None,
                reason: Some(err.to_string()),
            },
        }
    }
}
