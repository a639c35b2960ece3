#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use mastery_engine::db::{MasteryRecord, SqliteStore};

pub const SESSION: &str = "4f1c2b7e-session";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 14, 16, 0, 0).unwrap()
}

/// Record whose counters, level and mastery flag agree with each other.
pub fn consistent_record(concept_id: &str, attempted: u32, correct: u32) -> MasteryRecord {
    let mut record = MasteryRecord::new(SESSION, concept_id, fixed_now());
    record.questions_attempted = attempted;
    record.questions_correct = correct;
    record.current_level = record.success_rate();
    record.is_mastered = record.current_level >= 0.8;
    record
}

pub async fn temp_sqlite_store() -> (TempDir, SqliteStore) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let db_path = temp_dir.path().join("nested").join("mastery.db");
    let store = SqliteStore::open(&db_path)
        .await
        .expect("failed to open sqlite store");
    (temp_dir, store)
}
