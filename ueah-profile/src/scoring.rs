//! Overall-score aggregation for age buckets and the optional scoring
//! strategy that turns four skill scores into a titled band.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;
use crate::model::{AgeBucket, OverallEntry, Profile, Skill};
use crate::numbers::{clamp_score, mean_score, number_or_null};
use crate::sanitize::{clean_str, clean_text};

/// Latest score of each skill in one age bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillScores {
    pub reading: u8,
    pub listening: u8,
    pub writing: u8,
    pub speaking: u8,
}

impl SkillScores {
    /// `None` until all four skills have a latest score.
    #[must_use]
    pub fn from_bucket(bucket: &AgeBucket) -> Option<Self> {
        Some(Self {
            reading: bucket.reading.latest_score()?,
            listening: bucket.listening.latest_score()?,
            writing: bucket.writing.latest_score()?,
            speaking: bucket.speaking.latest_score()?,
        })
    }

    #[must_use]
    pub const fn as_array(&self) -> [u8; 4] {
        [self.reading, self.listening, self.writing, self.speaking]
    }

    #[must_use]
    pub fn mean(&self) -> u8 {
        mean_score(&self.as_array()).unwrap_or(0)
    }
}

/// What a strategy concluded about an age bucket.
#[derive(Debug, Clone, PartialEq)]
pub enum OverallVerdict {
    Incomplete,
    Complete {
        score: f64,
        title: String,
        band: Option<f64>,
    },
}

/// Level label derived for a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelInfo {
    pub level: Option<f64>,
    pub title: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("scoring strategy failed: {0}")]
    Failed(String),
    #[error("scoring strategy returned a malformed result: {0}")]
    Malformed(String),
}

/// Domain policy for overall scores and level titles.
///
/// Implementations may fail; the store falls back to a plain average for
/// overall scores and leaves levels unset.
pub trait ScoringStrategy {
    /// Combine the four latest skill scores of an age group.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy cannot be evaluated.
    fn compute_overall(
        &self,
        age_group: &str,
        scores: &SkillScores,
    ) -> Result<OverallVerdict, ScoringError>;

    /// Label a single run.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy cannot be evaluated.
    fn derive_level(
        &self,
        _age_group: &str,
        _slug: &str,
        _score: u8,
        _extra: &Value,
    ) -> Result<Option<LevelInfo>, ScoringError> {
        Ok(None)
    }
}

/// Decode a `{complete, score, title, band}` object produced by a
/// strategy living outside Rust.
///
/// # Errors
///
/// Returns [`ScoringError::Malformed`] if the value is not an object or a
/// complete verdict lacks a numeric score.
pub fn verdict_from_value(value: &Value) -> Result<OverallVerdict, ScoringError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ScoringError::Malformed(format!("expected object, got {value}")))?;
    if obj.get("complete").and_then(Value::as_bool) != Some(true) {
        return Ok(OverallVerdict::Incomplete);
    }
    let score = number_or_null(obj.get("score"))
        .ok_or_else(|| ScoringError::Malformed("complete verdict without score".to_string()))?;
    Ok(OverallVerdict::Complete {
        score,
        title: clean_text(obj.get("title"), usize::MAX),
        band: number_or_null(obj.get("band")).or_else(|| number_or_null(obj.get("level"))),
    })
}

/// Decode a `{level, title}` object; empty results yield `None`.
#[must_use]
pub fn level_from_value(value: &Value) -> Option<LevelInfo> {
    let obj = value.as_object()?;
    let info = LevelInfo {
        level: number_or_null(obj.get("level")),
        title: clean_text(obj.get("title"), usize::MAX),
    };
    (info.level.is_some() || !info.title.is_empty()).then_some(info)
}

/// Compute the overall entry an age bucket should carry right now.
///
/// Returns `None` while any skill lacks a latest score.
#[must_use]
pub fn compute_overall_snapshot(
    age_group: &str,
    bucket: &AgeBucket,
    strategy: Option<&dyn ScoringStrategy>,
    label_max: usize,
) -> Option<OverallEntry> {
    let scores = SkillScores::from_bucket(bucket)?;
    let at = latest_skill_at(bucket)?;

    let verdict = strategy.and_then(|strategy| {
        match strategy.compute_overall(age_group, &scores) {
            Ok(OverallVerdict::Complete { score, title, band }) => Some((score, title, band)),
            Ok(OverallVerdict::Incomplete) => None,
            Err(err) => {
                log::warn!(
                    "overall scoring for age group {age_group} fell back to average: {err}"
                );
                None
            }
        }
    });

    Some(match verdict {
        Some((score, title, band)) => OverallEntry {
            score: clamp_score(score),
            title: clean_str(&title, label_max),
            level: band.filter(|b| b.is_finite()),
            at,
        },
        None => OverallEntry {
            score: scores.mean(),
            title: String::new(),
            level: None,
            at,
        },
    })
}

fn latest_skill_at(bucket: &AgeBucket) -> Option<DateTime<Utc>> {
    Skill::ALL
        .into_iter()
        .filter_map(|skill| bucket.skill(skill).last_score.as_ref().map(|e| e.at))
        .max()
}

/// Result of reconciling one bucket's stored overall with its skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Unchanged,
    /// Same score, title and level; only the timestamp moved.
    Touched,
    Replaced,
    Cleared,
}

impl SyncOutcome {
    /// Core fields changed.
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Replaced | Self::Cleared)
    }

    /// Anything at all needs persisting.
    #[must_use]
    pub const fn is_dirty(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Bring a bucket's stored overall in line with its skill buckets.
pub fn sync_age_bucket_overall(
    age_group: &str,
    bucket: &mut AgeBucket,
    strategy: Option<&dyn ScoringStrategy>,
    label_max: usize,
) -> SyncOutcome {
    let Some(next) = compute_overall_snapshot(age_group, bucket, strategy, label_max) else {
        if bucket.overall.take().is_some() {
            log::debug!("age group {age_group} is no longer complete; clearing overall");
            return SyncOutcome::Cleared;
        }
        return SyncOutcome::Unchanged;
    };

    if let Some(current) = bucket.overall.as_mut()
        && current.same_core(&next)
    {
        if current.at == next.at {
            return SyncOutcome::Unchanged;
        }
        current.at = next.at;
        return SyncOutcome::Touched;
    }

    bucket.overall = Some(next);
    SyncOutcome::Replaced
}

/// Sync every age bucket; returns the most significant outcome.
pub fn sync_all_overalls(
    profile: &mut Profile,
    strategy: Option<&dyn ScoringStrategy>,
    label_max: usize,
) -> SyncOutcome {
    let mut summary = SyncOutcome::Unchanged;
    for (age_group, bucket) in &mut profile.results_by_age {
        let outcome = sync_age_bucket_overall(age_group, bucket, strategy, label_max);
        summary = match (summary, outcome) {
            (s, SyncOutcome::Unchanged) => s,
            (SyncOutcome::Unchanged, o) => o,
            (s, _) if s.changed() => s,
            (_, o) => o,
        };
    }
    summary
}

/// One row of a band table: scores at or above `min` earn this band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: u8,
    pub level: f64,
    pub title: String,
}

/// Threshold-table scoring strategy, optionally specialized per age group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandScoring {
    #[serde(default)]
    pub default: Vec<Band>,
    #[serde(default)]
    pub age_groups: BTreeMap<String, Vec<Band>>,
}

impl BandScoring {
    #[must_use]
    pub fn with_defaults() -> Self {
        let band = |min: u8, level: f64, title: &str| Band {
            min,
            level,
            title: title.to_string(),
        };
        Self {
            default: vec![
                band(0, 0.0, "Pre-A1 Starter"),
                band(20, 1.0, "A1 Beginner"),
                band(40, 2.0, "A2 Elementary"),
                band(60, 3.0, "B1 Intermediate"),
                band(75, 4.0, "B2 Upper-Intermediate"),
                band(90, 5.0, "C1 Advanced"),
            ],
            age_groups: BTreeMap::new(),
        }
    }

    /// Parse a band table from JSON and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a band exceeds 100.
    pub fn from_json(json_str: &str) -> Result<Self, ConfigError> {
        let table: Self =
            serde_json::from_str(json_str).map_err(|e| ConfigError::Parse(e.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let bands = self.default.iter().chain(self.age_groups.values().flatten());
        for band in bands {
            if band.min > 100 {
                return Err(ConfigError::Parse(format!(
                    "band '{}' has minimum {} above 100",
                    band.title, band.min
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn bands_for(&self, age_group: &str) -> &[Band] {
        self.age_groups
            .get(age_group)
            .filter(|bands| !bands.is_empty())
            .unwrap_or(&self.default)
    }

    /// Highest band whose minimum the score reaches.
    #[must_use]
    pub fn band_for(&self, age_group: &str, score: u8) -> Option<&Band> {
        self.bands_for(age_group)
            .iter()
            .filter(|band| band.min <= score)
            .max_by_key(|band| band.min)
    }
}

impl Default for BandScoring {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ScoringStrategy for BandScoring {
    fn compute_overall(
        &self,
        age_group: &str,
        scores: &SkillScores,
    ) -> Result<OverallVerdict, ScoringError> {
        let score = scores.mean();
        let band = self.band_for(age_group, score);
        Ok(OverallVerdict::Complete {
            score: f64::from(score),
            title: band.map(|b| b.title.clone()).unwrap_or_default(),
            band: band.map(|b| b.level),
        })
    }

    fn derive_level(
        &self,
        age_group: &str,
        _slug: &str,
        score: u8,
        _extra: &Value,
    ) -> Result<Option<LevelInfo>, ScoringError> {
        Ok(self.band_for(age_group, score).map(|band| LevelInfo {
            level: Some(band.level),
            title: band.title.clone(),
        }))
    }
}
