mod common;

use chrono::Duration;

use mastery_engine::db::{MasteryRecord, MasteryStore, MemoryStore, StoreError};
use mastery_engine::services::mastery::{apply_answer_event, AnswerEvent};

use common::{consistent_record, fixed_now, temp_sqlite_store, SESSION};

async fn assert_store_contract(store: &dyn MasteryStore) {
    assert!(store.get(SESSION, "fractions.adding").await.unwrap().is_none());
    assert!(store.list(SESSION).await.unwrap().is_empty());

    let created = store
        .create(MasteryRecord::new(SESSION, "fractions.adding", fixed_now()))
        .await
        .unwrap();
    let duplicate = store
        .create(MasteryRecord::new(SESSION, "fractions.adding", fixed_now()))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, StoreError::Conflict(_)));

    let mut updated = created.clone();
    updated.questions_attempted = 4;
    updated.questions_correct = 3;
    updated.current_level = 0.75;
    updated.avg_time_to_correct = Some(31.5);
    updated.mastery_achieved_date = Some(fixed_now());
    updated.needs_review = true;
    store.save(updated.clone()).await.unwrap();
    store.save(updated.clone()).await.unwrap();

    let loaded = store.get(SESSION, "fractions.adding").await.unwrap().unwrap();
    assert_eq!(loaded, updated);

    let mut early = consistent_record("decimals", 3, 1);
    early.next_review_due = fixed_now() - Duration::days(4);
    let mut later = consistent_record("percent", 3, 3);
    later.next_review_due = fixed_now() - Duration::days(1);
    let mut other_session = consistent_record("decimals", 1, 1);
    other_session.session_id = "another-session".to_string();
    other_session.next_review_due = fixed_now() - Duration::days(10);
    for record in [later, early, other_session] {
        store.save(record).await.unwrap();
    }

    let listed: Vec<String> = store
        .list(SESSION)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.concept_id)
        .collect();
    assert_eq!(listed, ["fractions.adding", "percent", "decimals"]);

    let due: Vec<String> = store
        .list_due(SESSION, fixed_now(), 10)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.concept_id)
        .collect();
    assert_eq!(due, ["decimals", "percent"]);

    let capped = store.list_due(SESSION, fixed_now(), 1).await.unwrap();
    assert_eq!(capped.len(), 1);
    assert_eq!(capped[0].concept_id, "decimals");
}

#[tokio::test]
async fn test_memory_store_contract() {
    let store = MemoryStore::new();
    assert_store_contract(&store).await;
}

#[tokio::test]
async fn test_sqlite_store_contract() {
    let (_temp_dir, store) = temp_sqlite_store().await;
    assert_store_contract(&store).await;
}

#[tokio::test]
async fn test_sqlite_schema_is_applied_once() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let db_path = temp_dir.path().join("mastery.db");

    let first = mastery_engine::db::SqliteStore::open(&db_path).await.unwrap();
    first
        .save(consistent_record("kept", 2, 1))
        .await
        .unwrap();
    first.pool().close().await;

    let reopened = mastery_engine::db::SqliteStore::open(&db_path).await.unwrap();
    let records = reopened.list(common::SESSION).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].concept_id, "kept");

    let version: String = sqlx::query_scalar(
        r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#,
    )
    .fetch_one(reopened.pool())
    .await
    .unwrap();
    assert_eq!(version, "1.0.0");
}

#[tokio::test]
async fn test_answer_events_round_trip_through_sqlite() {
    let (_temp_dir, store) = temp_sqlite_store().await;
    let mut now = fixed_now();

    for (is_correct, seconds) in [(true, 20.0), (true, 50.0), (false, 150.0), (true, 25.0)] {
        apply_answer_event(
            &store,
            SESSION,
            "geometry.area",
            &AnswerEvent::new(is_correct, seconds),
            60.0,
            now,
        )
        .await
        .unwrap();
        now += Duration::hours(6);
    }

    let record = store.get(SESSION, "geometry.area").await.unwrap().unwrap();
    assert_eq!(record.questions_attempted, 4);
    assert_eq!(record.questions_correct, 3);
    assert_eq!(record.streak_current, 1);
    assert_eq!(record.streak_best, 2);
    assert_eq!(record.current_level, 0.75);
    assert!(!record.is_mastered);
    assert_eq!(record.mastery_achieved_date, Some(fixed_now()));
    assert_eq!(record.repetitions, 1);
    assert_eq!(record.interval_days, 1);
    assert!(record.ease_factor >= 1.3);
    assert_eq!(record.first_attempt_date, fixed_now());
}
