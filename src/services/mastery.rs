use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{MasteryRecord, MasteryStore};
use crate::services::sm2::{score_quality, update_parameters};
use crate::services::{require_id, MasteryError};

pub const MASTERY_THRESHOLD: f64 = 0.8;
pub const PROFICIENT_THRESHOLD: f64 = 0.6;
pub const DEVELOPING_THRESHOLD: f64 = 0.4;

const AVG_TIME_HISTORY_WEIGHT: f64 = 0.7;
const QUESTIONS_PER_REVIEW: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryTier {
    Mastered,
    Proficient,
    Developing,
    Struggling,
}

pub fn classify_tier(level: f64) -> MasteryTier {
    if level >= MASTERY_THRESHOLD {
        MasteryTier::Mastered
    } else if level >= PROFICIENT_THRESHOLD {
        MasteryTier::Proficient
    } else if level >= DEVELOPING_THRESHOLD {
        MasteryTier::Developing
    } else {
        MasteryTier::Struggling
    }
}

pub fn mastery_level(correct: u32, attempted: u32) -> f64 {
    if attempted == 0 {
        return 0.0;
    }
    (f64::from(correct) / f64::from(attempted)).min(1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerEvent {
    pub is_correct: bool,
    pub time_taken_seconds: f64,
    #[serde(default)]
    pub had_hint: bool,
}

impl AnswerEvent {
    pub fn new(is_correct: bool, time_taken_seconds: f64) -> Self {
        Self {
            is_correct,
            time_taken_seconds,
            had_hint: false,
        }
    }

    pub fn with_hint(mut self) -> Self {
        self.had_hint = true;
        self
    }

    fn validate(&self) -> Result<(), MasteryError> {
        if !self.time_taken_seconds.is_finite() || self.time_taken_seconds < 0.0 {
            return Err(MasteryError::InvalidInput(format!(
                "time_taken_seconds must be a non-negative number, got {}",
                self.time_taken_seconds
            )));
        }
        Ok(())
    }
}

/// Applies one answer to `record` in place and returns the SM-2 quality used.
///
/// Pure apart from the supplied clock value; the store round trip lives in
/// [`apply_answer_event`].
pub fn record_answer(
    record: &mut MasteryRecord,
    event: &AnswerEvent,
    expected_time_seconds: f64,
    now: DateTime<Utc>,
) -> u8 {
    record.questions_attempted = record.questions_attempted.saturating_add(1);
    if event.is_correct {
        record.questions_correct = record.questions_correct.saturating_add(1);
        record.streak_current = record.streak_current.saturating_add(1);
        record.streak_best = record.streak_best.max(record.streak_current);
    } else {
        record.streak_current = 0;
    }

    record.current_level = mastery_level(record.questions_correct, record.questions_attempted);

    if record.current_level >= MASTERY_THRESHOLD {
        // The achievement date is stamped once and kept across later lapses.
        if !record.is_mastered && record.mastery_achieved_date.is_none() {
            record.mastery_achieved_date = Some(now);
        }
        record.is_mastered = true;
    } else {
        record.is_mastered = false;
    }

    let quality = score_quality(
        event.is_correct,
        event.time_taken_seconds,
        expected_time_seconds,
        event.had_hint,
    );
    let next = update_parameters(quality, record.sm2_state());
    record.ease_factor = next.ease_factor;
    record.interval_days = next.interval_days;
    record.repetitions = next.repetitions;

    record.last_practiced = now;
    record.next_review_due = now + Duration::days(i64::from(next.interval_days));
    record.needs_review = false;

    if event.is_correct {
        record.avg_time_to_correct = Some(match record.avg_time_to_correct {
            Some(avg) => {
                AVG_TIME_HISTORY_WEIGHT * avg
                    + (1.0 - AVG_TIME_HISTORY_WEIGHT) * event.time_taken_seconds
            }
            None => event.time_taken_seconds,
        });
    }

    record.updated_at = now;
    quality
}

/// Loads or creates the record for the pair, applies the answer and persists it.
pub async fn apply_answer_event(
    store: &dyn MasteryStore,
    session_id: &str,
    concept_id: &str,
    event: &AnswerEvent,
    expected_time_seconds: f64,
    now: DateTime<Utc>,
) -> Result<MasteryRecord, MasteryError> {
    require_id("session_id", session_id)?;
    require_id("concept_id", concept_id)?;
    event.validate()?;
    if !expected_time_seconds.is_finite() || expected_time_seconds <= 0.0 {
        return Err(MasteryError::InvalidInput(format!(
            "expected_time_seconds must be positive, got {expected_time_seconds}"
        )));
    }

    // New records are built in memory and written once, after the answer is applied.
    let (mut record, is_new) = match store.get(session_id, concept_id).await? {
        Some(existing) => (existing, false),
        None => (MasteryRecord::new(session_id, concept_id, now), true),
    };

    let was_mastered = record.is_mastered;
    let quality = record_answer(&mut record, event, expected_time_seconds, now);

    tracing::debug!(
        session_id,
        concept_id,
        is_new,
        is_correct = event.is_correct,
        quality,
        ease_factor = record.ease_factor,
        interval_days = record.interval_days,
        repetitions = record.repetitions,
        current_level = record.current_level,
        "answer applied"
    );

    let saved = if is_new {
        store.create(record).await?
    } else {
        store.save(record).await?
    };
    if saved.is_mastered && !was_mastered {
        tracing::info!(
            session_id,
            concept_id,
            current_level = saved.current_level,
            "concept mastered"
        );
    }
    Ok(saved)
}

/// Fetches a record that must already have answer history.
pub async fn get_record(
    store: &dyn MasteryStore,
    session_id: &str,
    concept_id: &str,
) -> Result<MasteryRecord, MasteryError> {
    store
        .get(session_id, concept_id)
        .await?
        .ok_or_else(|| {
            MasteryError::NotFound(format!(
                "no mastery record for session {session_id} and concept {concept_id}"
            ))
        })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterySummary {
    pub total_concepts: usize,
    pub mastered: usize,
    pub proficient: usize,
    pub developing: usize,
    pub struggling: usize,
    pub overall_mastery: f64,
    pub best_streak: u32,
    pub concepts_due_review: usize,
}

pub fn summarize(records: &[MasteryRecord], now: DateTime<Utc>) -> MasterySummary {
    if records.is_empty() {
        return MasterySummary::default();
    }

    let mut summary = MasterySummary {
        total_concepts: records.len(),
        ..MasterySummary::default()
    };

    let mut level_sum = 0.0;
    for record in records {
        match classify_tier(record.current_level) {
            MasteryTier::Mastered => summary.mastered += 1,
            MasteryTier::Proficient => summary.proficient += 1,
            MasteryTier::Developing => summary.developing += 1,
            MasteryTier::Struggling => summary.struggling += 1,
        }
        if record.current_level.is_finite() {
            level_sum += record.current_level;
        }
        summary.best_streak = summary.best_streak.max(record.streak_best);
        if record.is_due(now) {
            summary.concepts_due_review += 1;
        }
    }

    let mean = level_sum / records.len() as f64;
    summary.overall_mastery = (mean * 100.0).round() / 100.0;
    summary
}

pub async fn session_summary(
    store: &dyn MasteryStore,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<MasterySummary, MasteryError> {
    let records = store.list(session_id).await?;
    Ok(summarize(&records, now))
}

pub async fn due_for_review(
    store: &dyn MasteryStore,
    session_id: &str,
    now: DateTime<Utc>,
    limit: usize,
) -> Result<Vec<MasteryRecord>, MasteryError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    Ok(store.list_due(session_id, now, limit).await?)
}

/// Marks every due record of the session as needing review and clears the flag
/// on records that are not due. Returns the number of flagged records.
pub async fn refresh_review_flags(
    store: &dyn MasteryStore,
    session_id: &str,
    now: DateTime<Utc>,
) -> Result<usize, MasteryError> {
    let records = store.list(session_id).await?;
    let mut flagged = 0;
    let mut changed = 0;

    for mut record in records {
        let due = record.is_due(now);
        if due {
            flagged += 1;
        }
        if record.needs_review != due {
            record.needs_review = due;
            record.updated_at = now;
            store.save(record).await?;
            changed += 1;
        }
    }

    if changed > 0 {
        tracing::info!(session_id, flagged, changed, "review flags refreshed");
    }
    Ok(flagged)
}

/// Listing view of a due record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub concept_id: String,
    pub current_level: f64,
    pub last_practiced: DateTime<Utc>,
    pub next_review_due: DateTime<Utc>,
    pub questions_to_review: u32,
}

impl ReviewEntry {
    pub fn from_record(record: &MasteryRecord) -> Self {
        Self {
            concept_id: record.concept_id.clone(),
            current_level: record.current_level,
            last_practiced: record.last_practiced,
            next_review_due: record.next_review_due,
            questions_to_review: QUESTIONS_PER_REVIEW,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningProgress {
    pub mastery_summary: MasterySummary,
    pub concepts_due_count: usize,
    pub learning_streak: u32,
    pub overall_mastery: f64,
}

pub async fn learning_progress(
    store: &dyn MasteryStore,
    session_id: &str,
    now: DateTime<Utc>,
    review_limit: usize,
) -> Result<LearningProgress, MasteryError> {
    let mastery_summary = session_summary(store, session_id, now).await?;
    let due = due_for_review(store, session_id, now, review_limit).await?;

    Ok(LearningProgress {
        concepts_due_count: due.len(),
        learning_streak: mastery_summary.best_streak,
        overall_mastery: mastery_summary.overall_mastery,
        mastery_summary,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 8, 30, 0).unwrap()
    }

    fn record_with_level(concept_id: &str, level: f64) -> MasteryRecord {
        let mut record = MasteryRecord::new("session", concept_id, now());
        record.current_level = level;
        record
    }

    #[test]
    fn test_mastery_level_guards_zero_attempts() {
        assert_eq!(mastery_level(0, 0), 0.0);
        assert_eq!(mastery_level(3, 4), 0.75);
        assert_eq!(mastery_level(5, 4), 1.0);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(classify_tier(0.8), MasteryTier::Mastered);
        assert_eq!(classify_tier(0.79), MasteryTier::Proficient);
        assert_eq!(classify_tier(0.6), MasteryTier::Proficient);
        assert_eq!(classify_tier(0.59), MasteryTier::Developing);
        assert_eq!(classify_tier(0.4), MasteryTier::Developing);
        assert_eq!(classify_tier(0.39), MasteryTier::Struggling);
        assert_eq!(classify_tier(0.0), MasteryTier::Struggling);
    }

    #[test]
    fn test_first_correct_answer() {
        let mut record = MasteryRecord::new("session", "algebra.linear-equations", now());
        let quality = record_answer(&mut record, &AnswerEvent::new(true, 20.0), 60.0, now());

        assert_eq!(quality, 5);
        assert_eq!(record.questions_attempted, 1);
        assert_eq!(record.questions_correct, 1);
        assert_eq!(record.streak_current, 1);
        assert_eq!(record.streak_best, 1);
        assert_eq!(record.current_level, 1.0);
        assert!(record.is_mastered);
        assert_eq!(record.mastery_achieved_date, Some(now()));
        assert_eq!(record.repetitions, 1);
        assert_eq!(record.interval_days, 1);
        assert_eq!(record.next_review_due, now() + Duration::days(1));
        assert_eq!(record.avg_time_to_correct, Some(20.0));
    }

    #[test]
    fn test_wrong_answer_resets_streak_and_keeps_average() {
        let mut record = MasteryRecord::new("session", "geometry.triangles", now());
        record_answer(&mut record, &AnswerEvent::new(true, 40.0), 60.0, now());
        record_answer(&mut record, &AnswerEvent::new(true, 20.0), 60.0, now());
        record_answer(&mut record, &AnswerEvent::new(false, 200.0), 60.0, now());

        assert_eq!(record.streak_current, 0);
        assert_eq!(record.streak_best, 2);
        assert_eq!(record.repetitions, 0);
        assert_eq!(record.interval_days, 1);
        // 0.7 * 40 + 0.3 * 20
        let avg = record.avg_time_to_correct.unwrap();
        assert!((avg - 34.0).abs() < 1e-9);
    }

    #[test]
    fn test_mastery_date_not_restamped_after_lapse() {
        let first = now();
        let later = first + Duration::days(3);
        let mut record = MasteryRecord::new("session", "fractions.adding", first);
        record_answer(&mut record, &AnswerEvent::new(true, 10.0), 60.0, first);
        assert_eq!(record.mastery_achieved_date, Some(first));

        record_answer(&mut record, &AnswerEvent::new(false, 10.0), 60.0, later);
        assert!(!record.is_mastered);
        assert_eq!(record.mastery_achieved_date, Some(first));

        for _ in 0..4 {
            record_answer(&mut record, &AnswerEvent::new(true, 10.0), 60.0, later);
        }
        assert!(record.is_mastered);
        assert_eq!(record.mastery_achieved_date, Some(first));
    }

    #[test]
    fn test_summarize_empty_is_all_zero() {
        let summary = summarize(&[], now());
        assert_eq!(summary, MasterySummary::default());
        assert_eq!(summary.overall_mastery, 0.0);
    }

    #[test]
    fn test_summarize_counts_tiers_and_due() {
        let mut due = record_with_level("a", 0.9);
        due.next_review_due = now() - Duration::minutes(1);
        due.streak_best = 7;
        let records = vec![
            due,
            record_with_level("b", 0.65),
            record_with_level("c", 0.5),
            record_with_level("d", 0.1),
        ];

        let summary = summarize(&records, now());
        assert_eq!(summary.total_concepts, 4);
        assert_eq!(summary.mastered, 1);
        assert_eq!(summary.proficient, 1);
        assert_eq!(summary.developing, 1);
        assert_eq!(summary.struggling, 1);
        assert_eq!(summary.best_streak, 7);
        assert_eq!(summary.concepts_due_review, 1);
        // (0.9 + 0.65 + 0.5 + 0.1) / 4 = 0.5375
        assert_eq!(summary.overall_mastery, 0.54);
    }

    #[test]
    fn test_review_entry_projection() {
        let record = record_with_level("a", 0.3);
        let entry = ReviewEntry::from_record(&record);
        assert_eq!(entry.concept_id, "a");
        assert_eq!(entry.questions_to_review, 3);
        assert_eq!(entry.next_review_due, record.next_review_due);
    }
}
