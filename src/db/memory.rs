use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::db::{MasteryRecord, MasteryStore, StoreError};

type RecordKey = (String, String);

#[derive(Default)]
struct MemoryInner {
    records: Vec<MasteryRecord>,
    index: HashMap<RecordKey, usize>,
}

/// Process-local store. Iteration follows insertion order.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = MasteryRecord>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            for record in records {
                upsert(&mut inner, record);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key_of(record: &MasteryRecord) -> RecordKey {
    (record.session_id.clone(), record.concept_id.clone())
}

fn upsert(inner: &mut MemoryInner, record: MasteryRecord) {
    match inner.index.get(&key_of(&record)) {
        Some(&pos) => inner.records[pos] = record,
        None => {
            inner.index.insert(key_of(&record), inner.records.len());
            inner.records.push(record);
        }
    }
}

#[async_trait]
impl MasteryStore for MemoryStore {
    async fn get(
        &self,
        session_id: &str,
        concept_id: &str,
    ) -> Result<Option<MasteryRecord>, StoreError> {
        let inner = self.inner.read();
        let key = (session_id.to_string(), concept_id.to_string());
        Ok(inner.index.get(&key).map(|&pos| inner.records[pos].clone()))
    }

    async fn create(&self, record: MasteryRecord) -> Result<MasteryRecord, StoreError> {
        let mut inner = self.inner.write();
        if inner.index.contains_key(&key_of(&record)) {
            return Err(StoreError::Conflict(format!(
                "record for session {} and concept {} already exists",
                record.session_id, record.concept_id
            )));
        }
        upsert(&mut inner, record.clone());
        Ok(record)
    }

    async fn save(&self, record: MasteryRecord) -> Result<MasteryRecord, StoreError> {
        let mut inner = self.inner.write();
        upsert(&mut inner, record.clone());
        Ok(record)
    }

    async fn list(&self, session_id: &str) -> Result<Vec<MasteryRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .records
            .iter()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn list_due(
        &self,
        session_id: &str,
        as_of: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<MasteryRecord>, StoreError> {
        let mut due: Vec<MasteryRecord> = {
            let inner = self.inner.read();
            inner
                .records
                .iter()
                .filter(|record| record.session_id == session_id && record.is_due(as_of))
                .cloned()
                .collect()
        };
        // Stable sort keeps insertion order among equal due dates.
        due.sort_by_key(|record| record.next_review_due);
        due.truncate(limit);
        Ok(due)
    }
}
