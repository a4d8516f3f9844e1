#![allow(clippy::float_cmp)]

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Value, json};
use ueah_profile::{
    BandScoring, ImportOptions, ManualClock, MemoryStorage, MigrationKind, OverallVerdict,
    ProfileStorage, ProfileStore, ScoringError, ScoringStrategy, Skill, SkillScores,
};

const KEY: &str = "UEAH_PROFILE_V1";

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap()
}

fn fixture() -> (ProfileStore<MemoryStorage>, MemoryStorage, Rc<ManualClock>) {
    let storage = MemoryStorage::new();
    let clock = Rc::new(ManualClock::new(epoch()));
    let store = ProfileStore::new(storage.clone()).with_clock(Rc::clone(&clock));
    (store, storage, clock)
}

fn stored(storage: &MemoryStorage) -> Value {
    serde_json::from_str(&storage.raw(KEY).expect("profile stored")).unwrap()
}

#[test]
fn load_is_idempotent_after_self_healing_write() {
    let (store, storage, clock) = fixture();
    storage.insert_raw(
        KEY,
        &json!({
            "email": "A@B.com",
            "resultsByAge": {"4-7": {
                "reading": {"lastScore": {"score": 80, "at": "2024-09-01T00:00:00Z"}},
                "listening": {"lastScore": {"score": 70, "at": "2024-09-02T00:00:00Z"}},
                "writing": {"lastScore": {"score": 60, "at": "2024-09-03T00:00:00Z"}},
                "speaking": {"lastScore": {"score": 90, "at": "2024-09-04T00:00:00Z"}}
            }}
        })
        .to_string(),
    );

    let first = serde_json::to_string(&store.load()).unwrap();
    clock.advance(Duration::minutes(5));
    let second = serde_json::to_string(&store.load()).unwrap();
    clock.advance(Duration::minutes(5));
    let third = serde_json::to_string(&store.load()).unwrap();
    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(storage.raw(KEY).unwrap(), first);
}

#[test]
fn load_pins_timestamps_filled_in_for_current_documents() {
    let (store, storage, clock) = fixture();
    storage.insert_raw(
        KEY,
        &json!({
            "schemaVersion": 2,
            "resultsByAge": {"4-7": {"reading": {"lastScore": {"score": 80}}}}
        })
        .to_string(),
    );

    let first = serde_json::to_string(&store.load()).unwrap();
    clock.advance(Duration::minutes(5));
    let second = serde_json::to_string(&store.load()).unwrap();
    assert_eq!(first, second);
    assert_eq!(storage.raw(KEY).unwrap(), first);

    let profile = store.load();
    assert_eq!(profile.updated_at, epoch());
    let reading = profile.results_by_age["4-7"].reading.last_score.clone().unwrap();
    assert_eq!(reading.at, epoch());
}

#[test]
fn load_persists_text_corrections_once() {
    let (store, storage, clock) = fixture();
    storage.insert_raw(
        KEY,
        &json!({
            "schemaVersion": 2,
            "updatedAt": "2024-09-30T00:00:00Z",
            "email": "  Mixed@Case.ORG "
        })
        .to_string(),
    );
    assert_eq!(store.load().email, "mixed@case.org");
    assert_eq!(stored(&storage)["email"], json!("mixed@case.org"));

    let written = storage.raw(KEY).unwrap();
    clock.advance(Duration::minutes(1));
    store.load();
    assert_eq!(storage.raw(KEY).unwrap(), written);
}

#[test]
fn overall_appears_only_once_all_four_skills_are_scored() {
    let (store, _, _) = fixture();
    for (skill, score) in [("reading", 80), ("listening", 70), ("writing", 60)] {
        let profile = store.add_age_skill_score("8-10", skill, &json!({"score": score}));
        assert!(profile.results_by_age["8-10"].overall.is_none());
    }
    let profile = store.add_age_skill_score("8-10", "speaking", &json!({"score": 90}));
    let bucket = &profile.results_by_age["8-10"];
    assert!(bucket.is_complete());
    assert_eq!(bucket.overall.as_ref().map(|o| o.score), Some(75));
}

#[test]
fn overall_follows_configured_strategy() {
    let storage = MemoryStorage::new();
    let store = ProfileStore::new(storage).with_scoring(BandScoring::with_defaults());
    let scores = [
        ("reading", 95),
        ("listening", 90),
        ("writing", 88),
        ("speaking", 91),
    ];
    for (skill, score) in scores {
        store.add_age_skill_score("11-12", skill, &json!({"score": score}));
    }
    let overall = store.load().results_by_age["11-12"].overall.clone().unwrap();
    assert_eq!(overall.score, 91);
    assert_eq!(overall.title, "C1 Advanced");
    assert_eq!(overall.level, Some(5.0));
}

#[test]
fn duplicate_submissions_add_one_history_row() {
    let (store, _, clock) = fixture();
    let entry = json!({"score": 80, "rawCorrect": 8, "rawTotal": 10, "slug": "r-1"});
    store.add_age_skill_score("8-10", "reading", &entry);
    clock.advance(Duration::seconds(3));
    let mut again = entry.clone();
    again["breakdown"] = json!({"byType": {"mcq": 8}});
    let profile = store.add_age_skill_score("8-10", "reading", &again);
    let bucket = &profile.results_by_age["8-10"].reading;
    assert_eq!(bucket.history.len(), 1);
    assert!(bucket.history[0].breakdown.is_none());

    let profile = store.add_age_skill_score(
        "8-10",
        "reading",
        &json!({"score": 80, "rawCorrect": 8, "rawTotal": 10, "slug": "r-2"}),
    );
    assert_eq!(profile.results_by_age["8-10"].reading.history.len(), 2);
}

#[test]
fn scores_are_clamped_into_range() {
    let (store, _, _) = fixture();
    store.add_age_skill_score("4-7", "writing", &json!({"score": 150}));
    let profile = store.add_age_skill_score("4-7", "speaking", &json!({"score": -20}));
    let bucket = &profile.results_by_age["4-7"];
    assert_eq!(bucket.writing.latest_score(), Some(100));
    assert_eq!(bucket.speaking.latest_score(), Some(0));
}

#[test]
fn legacy_document_is_migrated_on_load() {
    let (store, storage, _) = fixture();
    storage.insert_raw(KEY, r#"{"email": "A@B.com", "name": "X"}"#);
    let profile = store.load();
    assert_eq!(profile.schema_version, 2);
    assert_eq!(profile.email, "a@b.com");
    assert_eq!(profile.name, "X");
    assert!(profile.results_by_age.is_empty());
    assert_eq!(stored(&storage)["schemaVersion"], json!(2));
}

#[test]
fn bootstrap_reports_each_migration_path() {
    let (store, storage, _) = fixture();
    storage.insert_raw(KEY, "{corrupted");
    assert_eq!(store.bootstrap(), MigrationKind::Fresh);
    storage.insert_raw(KEY, r#"{"schemaVersion": 1, "name": "Old", "legacyFlag": 1}"#);
    assert_eq!(store.bootstrap(), MigrationKind::Upgraded);
    let doc = stored(&storage);
    assert_eq!(doc["name"], json!("Old"));
    assert!(doc.get("legacyFlag").is_none());
    assert_eq!(store.bootstrap(), MigrationKind::Current);
}

#[test]
fn export_then_replace_import_round_trips() {
    let (store, _, clock) = fixture();
    store.set(&json!({
        "name": "Lan",
        "email": "lan@example.org",
        "targetScore": "7",
        "locale": "vi-VN",
        "notes": "evening practice"
    }));
    store.add_iels_score(&json!({"overall": 6.5, "reading": 7, "listening": 6.5}));
    let scores = [
        ("reading", 80),
        ("listening", 70),
        ("writing", 60),
        ("speaking", 90),
    ];
    for (skill, score) in scores {
        clock.advance(Duration::minutes(1));
        let entry = json!({"score": score, "slug": format!("{skill}-1")});
        store.add_age_skill_score("4-7", skill, &entry);
    }
    let partial = json!({"score": 55, "breakdown": {"hard": 1}});
    store.add_age_skill_score("11-12", "reading", &partial);

    let exported = store.export_data();
    let payload = serde_json::to_value(&exported).unwrap();
    store.set(&json!({"name": "Someone else"}));
    clock.advance(Duration::hours(1));

    let report = store.import_data(&payload, ImportOptions::replace()).unwrap();
    assert_eq!(report.updated_at, epoch() + Duration::minutes(4) + Duration::hours(1));
    let restored = store.export_data();
    assert_eq!(restored.profile, exported.profile);
}

#[test]
fn import_accepts_string_payloads() {
    let (store, _, _) = fixture();
    let text = json!({"schemaVersion": 2, "profile": {"name": "Tab"}}).to_string();
    assert!(store.import_json(&text, ImportOptions::default()).is_ok());
    assert_eq!(store.load().name, "Tab");
}

#[test]
fn history_keeps_fifty_newest_first() {
    let (store, _, clock) = fixture();
    for i in 0..60 {
        clock.advance(Duration::seconds(1));
        let entry = json!({"score": i, "slug": format!("l-{i}")});
        store.add_age_skill_score("8-10", "listening", &entry);
    }
    let bucket = store.load().results_by_age["8-10"].listening.clone();
    assert_eq!(bucket.history.len(), 50);
    assert_eq!(bucket.history[0].slug, "l-59");
    assert_eq!(bucket.history[49].slug, "l-10");
    assert!(bucket.history.windows(2).all(|w| w[0].at > w[1].at));
}

#[test]
fn four_skill_scenario_averages_to_seventy_five() {
    let (store, _, _) = fixture();
    store.add_age_skill_score("4-7", "reading", &json!({"score": 80, "slug": "s1"}));
    store.add_age_skill_score("4-7", "listening", &json!({"score": 70}));
    store.add_age_skill_score("4-7", "writing", &json!({"score": 60}));
    let profile = store.add_age_skill_score("4-7", "speaking", &json!({"score": 90}));

    let bucket = &profile.results_by_age["4-7"];
    let expected = [
        (Skill::Reading, 80),
        (Skill::Listening, 70),
        (Skill::Writing, 60),
        (Skill::Speaking, 90),
    ];
    for (skill, score) in expected {
        assert_eq!(bucket.skill(skill).latest_score(), Some(score), "{skill}");
    }
    assert_eq!(bucket.reading.history[0].slug, "s1");
    assert_eq!(bucket.overall.as_ref().map(|o| o.score), Some(75));
}

#[test]
fn clearing_one_age_group_leaves_the_rest() {
    let (store, _, _) = fixture();
    for skill in ["reading", "listening", "writing", "speaking"] {
        store.add_age_skill_score("4-7", skill, &json!({"score": 75}));
    }
    store.add_age_skill_score("ielts", "reading", &json!({"score": 50}));

    let profile = store.clear_age_results(Some("4-7"));
    assert!(!profile.results_by_age.contains_key("4-7"));
    assert!(profile.results_by_age.contains_key("ielts"));

    let profile = store.clear_age_results(None);
    assert!(profile.results_by_age.is_empty());
}

#[derive(Debug)]
struct QuotaExceeded;

impl fmt::Display for QuotaExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("quota exceeded")
    }
}

impl std::error::Error for QuotaExceeded {}

#[derive(Default)]
struct BrokenStorage {
    writes: Cell<usize>,
}

impl ProfileStorage for BrokenStorage {
    type Error = QuotaExceeded;

    fn read(&self, _key: &str) -> Result<Option<String>, Self::Error> {
        Err(QuotaExceeded)
    }

    fn write(&self, _key: &str, _value: &str) -> Result<(), Self::Error> {
        self.writes.set(self.writes.get() + 1);
        Err(QuotaExceeded)
    }

    fn remove(&self, _key: &str) -> Result<(), Self::Error> {
        Err(QuotaExceeded)
    }
}

#[test]
fn storage_failures_degrade_to_in_memory_results() {
    let notified = Rc::new(Cell::new(false));
    let flag = Rc::clone(&notified);
    let mut store = ProfileStore::new(BrokenStorage::default());
    store.subscribe(move |_| flag.set(true));

    let profile = store.add_age_skill_score("4-7", "reading", &json!({"score": 66}));
    assert_eq!(profile.results_by_age["4-7"].reading.latest_score(), Some(66));
    assert_eq!(store.load().name, "");
    store.clear();
    assert!(store.storage().writes.get() > 0);
    assert!(!notified.get());
}

struct Recording {
    calls: RefCell<Vec<String>>,
    verdict: Result<OverallVerdict, ScoringError>,
}

impl ScoringStrategy for Recording {
    fn compute_overall(
        &self,
        age_group: &str,
        scores: &SkillScores,
    ) -> Result<OverallVerdict, ScoringError> {
        let joined = scores.as_array().map(|s| s.to_string()).join(",");
        self.calls.borrow_mut().push(format!("{age_group}:{joined}"));
        self.verdict.clone()
    }
}

#[test]
fn strategy_sees_latest_scores_and_failures_fall_back() {
    let store = ProfileStore::new(MemoryStorage::new()).with_scoring(Recording {
        calls: RefCell::new(Vec::new()),
        verdict: Err(ScoringError::Failed("offline".to_string())),
    });
    let scores = [
        ("reading", 10),
        ("listening", 20),
        ("writing", 30),
        ("speaking", 41),
    ];
    for (skill, score) in scores {
        store.add_age_skill_score("4-7", skill, &json!({"score": score}));
    }
    let overall = store.load().results_by_age["4-7"].overall.clone().unwrap();
    assert_eq!(overall.score, 25);
    assert!(overall.title.is_empty());
}
