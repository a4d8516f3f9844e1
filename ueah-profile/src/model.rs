//! Typed profile document: learner info, composite score history and
//! per-age-group skill results.
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StoreConfig;
use crate::constants::{SCHEMA_VERSION, SCORE_MAX};
use crate::sanitize::{clean_age_group, clean_str};

/// One of the four tracked language skills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Skill {
    Reading,
    Listening,
    Writing,
    Speaking,
}

impl Skill {
    pub const ALL: [Self; 4] = [
        Self::Reading,
        Self::Listening,
        Self::Writing,
        Self::Speaking,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Listening => "listening",
            Self::Writing => "writing",
            Self::Speaking => "speaking",
        }
    }

    /// Parse a skill name, ignoring surrounding whitespace and case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|skill| skill.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Skill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed quiz run for one skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillEntry {
    pub score: u8,
    pub raw_correct: Option<f64>,
    pub raw_total: Option<f64>,
    pub level_title: String,
    pub level: Option<f64>,
    /// Diagnostic payload from the runner, stored as received.
    pub breakdown: Option<Value>,
    pub slug: String,
    pub skill: Skill,
    pub at: DateTime<Utc>,
}

impl SkillEntry {
    /// Whether two entries describe the same run result.
    ///
    /// Only `score`, `rawCorrect`, `rawTotal` and `slug` take part; level
    /// labels, breakdowns and timestamps are ignored.
    #[must_use]
    pub fn same_result(&self, other: &Self) -> bool {
        self.score == other.score
            && self.raw_correct == other.raw_correct
            && self.raw_total == other.raw_total
            && self.slug == other.slug
    }
}

/// Score history for a single skill within an age group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillBucket {
    pub last_score: Option<SkillEntry>,
    pub history: Vec<SkillEntry>,
}

impl SkillBucket {
    /// Record a run, newest first. Returns `false` when the entry repeats
    /// the current `lastScore` and nothing was recorded.
    pub fn record(&mut self, entry: SkillEntry, limit: usize) -> bool {
        if self
            .last_score
            .as_ref()
            .is_some_and(|last| last.same_result(&entry))
        {
            return false;
        }
        self.history.insert(0, entry.clone());
        self.history.truncate(limit);
        self.last_score = Some(entry);
        true
    }

    #[must_use]
    pub fn latest_score(&self) -> Option<u8> {
        self.last_score.as_ref().map(|entry| entry.score)
    }
}

/// Derived age-group score, recomputed from the four skill buckets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallEntry {
    pub score: u8,
    pub title: String,
    pub level: Option<f64>,
    pub at: DateTime<Utc>,
}

impl OverallEntry {
    /// Equality on `score`, `title` and `level`; timestamps excluded.
    #[must_use]
    pub fn same_core(&self, other: &Self) -> bool {
        self.score == other.score && self.title == other.title && self.level == other.level
    }
}

/// Results for one age group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgeBucket {
    pub reading: SkillBucket,
    pub listening: SkillBucket,
    pub writing: SkillBucket,
    pub speaking: SkillBucket,
    pub overall: Option<OverallEntry>,
}

impl AgeBucket {
    #[must_use]
    pub const fn skill(&self, skill: Skill) -> &SkillBucket {
        match skill {
            Skill::Reading => &self.reading,
            Skill::Listening => &self.listening,
            Skill::Writing => &self.writing,
            Skill::Speaking => &self.speaking,
        }
    }

    pub const fn skill_mut(&mut self, skill: Skill) -> &mut SkillBucket {
        match skill {
            Skill::Reading => &mut self.reading,
            Skill::Listening => &mut self.listening,
            Skill::Writing => &mut self.writing,
            Skill::Speaking => &mut self.speaking,
        }
    }

    /// True once every skill has a latest score.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        Skill::ALL
            .into_iter()
            .all(|skill| self.skill(skill).last_score.is_some())
    }
}

/// A flat composite score (IELTS-style bands), tracked outside age groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IelsEntry {
    pub overall: Option<f64>,
    pub reading: Option<f64>,
    pub listening: Option<f64>,
    pub speaking: Option<f64>,
    pub writing: Option<f64>,
    pub at: DateTime<Utc>,
}

impl IelsEntry {
    /// Entries are only meaningful with a finite overall band.
    #[must_use]
    pub fn has_overall(&self) -> bool {
        self.overall.is_some_and(f64::is_finite)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IelsBlock {
    pub last_score: Option<IelsEntry>,
    pub history: Vec<IelsEntry>,
}

impl IelsBlock {
    pub fn record(&mut self, entry: IelsEntry, limit: usize) {
        self.history.insert(0, entry.clone());
        self.history.truncate(limit);
        self.last_score = Some(entry);
    }
}

/// The root profile document, one per device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub schema_version: u32,
    pub updated_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    pub target_score: String,
    pub locale: String,
    pub notes: String,
    pub iels: IelsBlock,
    pub results_by_age: BTreeMap<String, AgeBucket>,
}

impl Profile {
    /// An empty document at the current schema version.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            updated_at: now,
            name: String::new(),
            email: String::new(),
            target_score: String::new(),
            locale: String::new(),
            notes: String::new(),
            iels: IelsBlock::default(),
            results_by_age: BTreeMap::new(),
        }
    }

    /// Re-apply text bounds, score bounds, history caps and key
    /// normalization in place.
    pub fn sanitize(&mut self, config: &StoreConfig) {
        let limits = &config.limits;
        self.schema_version = SCHEMA_VERSION;
        self.name = clean_str(&self.name, limits.name);
        self.email = clean_str(&self.email, limits.email).to_lowercase();
        self.target_score = clean_str(&self.target_score, limits.target_score);
        self.locale = clean_str(&self.locale, limits.locale);
        self.notes = clean_str(&self.notes, limits.notes);

        self.iels.history.retain(IelsEntry::has_overall);
        self.iels.history.truncate(config.history_limit);
        if !self.iels.last_score.as_ref().is_some_and(IelsEntry::has_overall) {
            self.iels.last_score = None;
        }

        let buckets = std::mem::take(&mut self.results_by_age);
        for (key, mut bucket) in buckets {
            let Some(key) = clean_age_group(&key, limits.age_group) else {
                continue;
            };
            for skill in Skill::ALL {
                let slot = bucket.skill_mut(skill);
                slot.history.truncate(config.history_limit);
                for entry in slot.last_score.iter_mut().chain(slot.history.iter_mut()) {
                    entry.skill = skill;
                    entry.score = entry.score.min(SCORE_MAX);
                    entry.slug = clean_str(&entry.slug, limits.label);
                    entry.level_title = clean_str(&entry.level_title, limits.label);
                }
            }
            if let Some(overall) = bucket.overall.as_mut() {
                overall.score = overall.score.min(SCORE_MAX);
                overall.title = clean_str(&overall.title, limits.label);
            }
            self.results_by_age.entry(key).or_insert(bucket);
        }
    }
}
