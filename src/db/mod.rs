pub mod memory;
pub mod record;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use record::MasteryRecord;
pub use sqlite::{SqliteInitError, SqliteStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record conflict: {0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Durable storage for mastery records, keyed by (session_id, concept_id).
///
/// Implementations own persistence and deletion. `save` must replace the whole
/// record atomically; serializing concurrent read-modify-write cycles on one
/// pair is left to the caller (see [`crate::state::MasteryEngine`]).
#[async_trait]
pub trait MasteryStore: Send + Sync {
    async fn get(
        &self,
        session_id: &str,
        concept_id: &str,
    ) -> Result<Option<MasteryRecord>, StoreError>;

    /// Inserts a new record; fails with [`StoreError::Conflict`] when the pair exists.
    async fn create(&self, record: MasteryRecord) -> Result<MasteryRecord, StoreError>;

    /// Idempotent upsert of a full record.
    async fn save(&self, record: MasteryRecord) -> Result<MasteryRecord, StoreError>;

    /// All records of a session in creation order.
    async fn list(&self, session_id: &str) -> Result<Vec<MasteryRecord>, StoreError>;

    /// Records with `next_review_due <= as_of`, earliest first, at most `limit`.
    async fn list_due(
        &self,
        session_id: &str,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MasteryRecord>, StoreError>;
}
