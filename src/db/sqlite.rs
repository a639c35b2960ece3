use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::db::{MasteryRecord, MasteryStore, StoreError};

pub const MASTERY_SCHEMA_SQL: &str = include_str!("../../sql/mastery_schema.sql");
const SCHEMA_VERSION: &str = "1.0.0";

const RECORD_COLUMNS: &str = r#""id","sessionId","conceptId","currentLevel","questionsAttempted",
  "questionsCorrect","streakCurrent","streakBest","firstAttemptDate","lastPracticed",
  "nextReviewDue","easeFactor","intervalDays","repetitions","avgTimeToCorrect",
  "masteryAchievedDate","isMastered","needsReview","updatedAt""#;

#[derive(Debug, thiserror::Error)]
pub enum SqliteInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// `sqlx` SQLite adapter for [`MasteryStore`].
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file and applies the schema.
    pub async fn open(db_path: &Path) -> Result<Self, SqliteInitError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SqliteInitError::Io(e.to_string()))?;
        }

        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
        let options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| SqliteInitError::Config(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, SqliteInitError> {
        apply_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    let version: Option<String> =
        sqlx::query_scalar(r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#)
            .fetch_optional(pool)
            .await
            .unwrap_or(None);

    if version.is_some() {
        tracing::debug!(version = ?version, "mastery schema already applied");
        return Ok(());
    }

    for statement in schema_statements(MASTERY_SCHEMA_SQL) {
        sqlx::query(&statement).execute(pool).await?;
    }

    sqlx::query(
        r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#,
    )
    .bind(SCHEMA_VERSION)
    .execute(pool)
    .await?;

    tracing::info!(version = SCHEMA_VERSION, "mastery schema applied");
    Ok(())
}

/// Splits the schema file into executable statements, dropping `--` comment lines.
fn schema_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|chunk| {
            chunk
                .lines()
                .filter(|line| !line.trim_start().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .map(|stmt| stmt.trim().to_string())
        .filter(|stmt| !stmt.is_empty())
        .collect()
}

fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("{column}: {e}")))
}

fn read_count(row: &SqliteRow, column: &str) -> Result<u32, StoreError> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| StoreError::Corrupt(format!("{column}: {raw} out of range")))
}

fn map_sqlite_row(row: &SqliteRow) -> Result<MasteryRecord, StoreError> {
    let first_attempt: String = row.try_get("firstAttemptDate")?;
    let last_practiced: String = row.try_get("lastPracticed")?;
    let next_review_due: String = row.try_get("nextReviewDue")?;
    let mastery_achieved: Option<String> = row.try_get("masteryAchievedDate")?;
    let updated_at: String = row.try_get("updatedAt")?;

    Ok(MasteryRecord {
        id: row.try_get("id")?,
        session_id: row.try_get("sessionId")?,
        concept_id: row.try_get("conceptId")?,
        current_level: row.try_get("currentLevel")?,
        questions_attempted: read_count(row, "questionsAttempted")?,
        questions_correct: read_count(row, "questionsCorrect")?,
        streak_current: read_count(row, "streakCurrent")?,
        streak_best: read_count(row, "streakBest")?,
        first_attempt_date: parse_timestamp(&first_attempt, "firstAttemptDate")?,
        last_practiced: parse_timestamp(&last_practiced, "lastPracticed")?,
        next_review_due: parse_timestamp(&next_review_due, "nextReviewDue")?,
        ease_factor: row.try_get("easeFactor")?,
        interval_days: read_count(row, "intervalDays")?,
        repetitions: read_count(row, "repetitions")?,
        avg_time_to_correct: row.try_get("avgTimeToCorrect")?,
        mastery_achieved_date: mastery_achieved
            .as_deref()
            .map(|value| parse_timestamp(value, "masteryAchievedDate"))
            .transpose()?,
        is_mastered: row.try_get("isMastered")?,
        needs_review: row.try_get("needsReview")?,
        updated_at: parse_timestamp(&updated_at, "updatedAt")?,
    })
}

fn bind_record<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    record: &MasteryRecord,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(record.id.clone())
        .bind(record.session_id.clone())
        .bind(record.concept_id.clone())
        .bind(record.current_level)
        .bind(i64::from(record.questions_attempted))
        .bind(i64::from(record.questions_correct))
        .bind(i64::from(record.streak_current))
        .bind(i64::from(record.streak_best))
        .bind(format_timestamp(record.first_attempt_date))
        .bind(format_timestamp(record.last_practiced))
        .bind(format_timestamp(record.next_review_due))
        .bind(record.ease_factor)
        .bind(i64::from(record.interval_days))
        .bind(i64::from(record.repetitions))
        .bind(record.avg_time_to_correct)
        .bind(record.mastery_achieved_date.map(format_timestamp))
        .bind(record.is_mastered)
        .bind(record.needs_review)
        .bind(format_timestamp(record.updated_at))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}

#[async_trait]
impl MasteryStore for SqliteStore {
    async fn get(
        &self,
        session_id: &str,
        concept_id: &str,
    ) -> Result<Option<MasteryRecord>, StoreError> {
        let sql = format!(
            r#"SELECT {RECORD_COLUMNS} FROM "mastery_records"
            WHERE "sessionId" = ? AND "conceptId" = ? LIMIT 1"#
        );
        let row = sqlx::query(&sql)
            .bind(session_id)
            .bind(concept_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(map_sqlite_row).transpose()
    }

    async fn create(&self, record: MasteryRecord) -> Result<MasteryRecord, StoreError> {
        let sql = format!(
            r#"INSERT INTO "mastery_records" ({RECORD_COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#
        );
        match bind_record(sqlx::query(&sql), &record).execute(&self.pool).await {
            Ok(_) => Ok(record),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(format!(
                "record for session {} and concept {} already exists",
                record.session_id, record.concept_id
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, record: MasteryRecord) -> Result<MasteryRecord, StoreError> {
        let sql = format!(
            r#"INSERT INTO "mastery_records" ({RECORD_COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT ("sessionId", "conceptId") DO UPDATE SET
              "currentLevel" = excluded."currentLevel",
              "questionsAttempted" = excluded."questionsAttempted",
              "questionsCorrect" = excluded."questionsCorrect",
              "streakCurrent" = excluded."streakCurrent",
              "streakBest" = excluded."streakBest",
              "firstAttemptDate" = excluded."firstAttemptDate",
              "lastPracticed" = excluded."lastPracticed",
              "nextReviewDue" = excluded."nextReviewDue",
              "easeFactor" = excluded."easeFactor",
              "intervalDays" = excluded."intervalDays",
              "repetitions" = excluded."repetitions",
              "avgTimeToCorrect" = excluded."avgTimeToCorrect",
              "masteryAchievedDate" = excluded."masteryAchievedDate",
              "isMastered" = excluded."isMastered",
              "needsReview" = excluded."needsReview",
              "updatedAt" = excluded."updatedAt""#
        );
        bind_record(sqlx::query(&sql), &record)
            .execute(&self.pool)
            .await?;
        Ok(record)
    }

    async fn list(&self, session_id: &str) -> Result<Vec<MasteryRecord>, StoreError> {
        let sql = format!(
            r#"SELECT {RECORD_COLUMNS} FROM "mastery_records"
            WHERE "sessionId" = ? ORDER BY "rowid" ASC"#
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_sqlite_row).collect()
    }

    async fn list_due(
        &self,
        session_id: &str,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MasteryRecord>, StoreError> {
        let sql = format!(
            r#"SELECT {RECORD_COLUMNS} FROM "mastery_records"
            WHERE "sessionId" = ? AND "nextReviewDue" <= ?
            ORDER BY "nextReviewDue" ASC, "rowid" ASC
            LIMIT ?"#
        );
        let rows = sqlx::query(&sql)
            .bind(session_id)
            .bind(format_timestamp(as_of))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(map_sqlite_row).collect()
    }
}
