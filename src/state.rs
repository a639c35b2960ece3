use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::config::EngineConfig;
use crate::db::{MasteryRecord, MasteryStore};
use crate::services::mastery::{self, AnswerEvent, LearningProgress, MasterySummary};
use crate::services::practice_queue::{self, PerformanceEntry, PracticeItem};
use crate::services::zpd::{self, DifficultyAssessment};
use crate::services::MasteryError;

type RecordKey = (String, String);

struct LockSlot {
    lock: Arc<Mutex<()>>,
    users: usize,
}

/// Serializes read-modify-write cycles per (session, concept) pair.
#[derive(Default)]
struct RecordLocks {
    slots: parking_lot::Mutex<HashMap<RecordKey, LockSlot>>,
}

impl RecordLocks {
    /// Registers the caller on the pair's slot before waiting, so a dropped
    /// future still unregisters through [`RecordLockGuard`].
    async fn acquire(&self, key: RecordKey) -> RecordLockGuard<'_> {
        let lock = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.clone()).or_insert_with(|| LockSlot {
                lock: Arc::default(),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        let mut guard = RecordLockGuard {
            locks: self,
            key,
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Holds a pair's lock; dropping it unlocks and frees the slot once unused.
struct RecordLockGuard<'a> {
    locks: &'a RecordLocks,
    key: RecordKey,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for RecordLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());

        let mut slots = self.locks.slots.lock();
        let unused = match slots.get_mut(&self.key) {
            Some(slot) => {
                slot.users = slot.users.saturating_sub(1);
                slot.users == 0
            }
            None => false,
        };
        if unused {
            slots.remove(&self.key);
        }
    }
}

/// Wall clock at the storage precision (SQLite keeps milliseconds).
fn clock_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
}

/// Use-case entry points over an injected record store.
///
/// Clock reads happen here; everything below takes `now` explicitly.
pub struct MasteryEngine {
    store: Arc<dyn MasteryStore>,
    config: EngineConfig,
    record_locks: RecordLocks,
}

impl MasteryEngine {
    pub fn new(store: Arc<dyn MasteryStore>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            record_locks: RecordLocks::default(),
        }
    }

    pub fn store(&self) -> &dyn MasteryStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn apply_answer_event(
        &self,
        session_id: &str,
        concept_id: &str,
        event: AnswerEvent,
    ) -> Result<MasteryRecord, MasteryError> {
        let key = (session_id.to_string(), concept_id.to_string());
        let lock = self.record_locks.acquire(key).await;
        let result = mastery::apply_answer_event(
            self.store(),
            session_id,
            concept_id,
            &event,
            self.config.expected_time_seconds,
            clock_now(),
        )
        .await;
        drop(lock);

        if let Err(err) = &result {
            tracing::warn!(session_id, concept_id, error = %err, "answer event rejected");
        }
        result
    }

    pub async fn record(
        &self,
        session_id: &str,
        concept_id: &str,
    ) -> Result<MasteryRecord, MasteryError> {
        mastery::get_record(self.store(), session_id, concept_id).await
    }

    pub async fn summary(&self, session_id: &str) -> Result<MasterySummary, MasteryError> {
        mastery::session_summary(self.store(), session_id, clock_now()).await
    }

    pub async fn due_for_review(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<MasteryRecord>, MasteryError> {
        mastery::due_for_review(self.store(), session_id, clock_now(), limit).await
    }

    pub async fn refresh_review_flags(&self, session_id: &str) -> Result<usize, MasteryError> {
        mastery::refresh_review_flags(self.store(), session_id, clock_now()).await
    }

    pub async fn learning_progress(
        &self,
        session_id: &str,
    ) -> Result<LearningProgress, MasteryError> {
        mastery::learning_progress(
            self.store(),
            session_id,
            clock_now(),
            self.config.progress_review_limit,
        )
        .await
    }

    pub async fn current_difficulty(
        &self,
        session_id: &str,
        concept_id: &str,
    ) -> Result<f64, MasteryError> {
        zpd::current_difficulty(self.store(), session_id, concept_id).await
    }

    pub async fn assess_difficulty(
        &self,
        session_id: &str,
        concept_id: &str,
    ) -> Result<DifficultyAssessment, MasteryError> {
        zpd::assess_difficulty(self.store(), session_id, concept_id).await
    }

    /// Builds a practice queue; `None` falls back to the configured defaults.
    pub async fn build_session(
        &self,
        session_id: &str,
        target_questions: Option<usize>,
        mix_ratio: Option<f64>,
    ) -> Result<Vec<PracticeItem>, MasteryError> {
        practice_queue::build_session(
            self.store(),
            session_id,
            target_questions.unwrap_or(self.config.default_target_questions),
            mix_ratio.unwrap_or(self.config.default_mix_ratio),
        )
        .await
    }

    pub async fn recommend_next(
        &self,
        session_id: &str,
        recent_performance: &[PerformanceEntry],
    ) -> Result<PracticeItem, MasteryError> {
        practice_queue::recommend_next(
            self.store(),
            session_id,
            recent_performance,
            self.config.default_mix_ratio,
        )
        .await
    }
}
