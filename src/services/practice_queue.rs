use serde::{Deserialize, Serialize};

use crate::db::{MasteryRecord, MasteryStore};
use crate::services::mastery::MASTERY_THRESHOLD;
use crate::services::zpd::{
    detect_streak_adjustment, difficulty_for_record, DifficultyAdjustment, COLD_START_DIFFICULTY,
    MAX_DIFFICULTY, MIN_DIFFICULTY,
};
use crate::services::{require_id, MasteryError};

pub const DEFAULT_TARGET_QUESTIONS: usize = 20;
pub const DEFAULT_MIX_RATIO: f64 = 0.7;

const MAINTENANCE_DIFFICULTY: f64 = 0.7;
const RECOMMENDATION_WINDOW: usize = 5;
const STREAK_NUDGE: f64 = 0.1;

const DIAGNOSTIC_MESSAGE: &str =
    "Start with a diagnostic assessment to identify your current level";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

/// Queue partition a record can fall into. A record may match several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PracticeCategory {
    Weak,
    Review,
    Mastered,
}

impl PracticeCategory {
    pub fn matches(self, record: &MasteryRecord) -> bool {
        match self {
            Self::Weak => record.current_level < MASTERY_THRESHOLD && !record.is_mastered,
            Self::Review => record.needs_review,
            Self::Mastered => record.is_mastered,
        }
    }

    pub fn priority(self) -> Priority {
        match self {
            Self::Weak => Priority::High,
            Self::Review => Priority::Medium,
            Self::Mastered => Priority::Low,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Weak => "Building mastery",
            Self::Review => "Spaced repetition review",
            Self::Mastered => "Maintaining mastery",
        }
    }

    fn difficulty(self, record: &MasteryRecord) -> f64 {
        match self {
            Self::Weak | Self::Review => difficulty_for_record(Some(record)),
            Self::Mastered => MAINTENANCE_DIFFICULTY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PracticeTarget {
    pub concept_id: String,
    pub difficulty_score: f64,
    pub reason: String,
    pub current_mastery: f64,
    pub priority: Priority,
}

impl PracticeTarget {
    fn from_record(category: PracticeCategory, record: &MasteryRecord) -> Self {
        Self {
            concept_id: record.concept_id.clone(),
            difficulty_score: category.difficulty(record),
            reason: category.reason().to_string(),
            current_mastery: record.current_level,
            priority: category.priority(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PracticeItem {
    /// The session has no history yet.
    Diagnostic { message: String },
    Practice(PracticeTarget),
    /// Same concept again after a streak, nudged one step.
    Adjusted {
        concept_id: String,
        difficulty_score: f64,
        adjustment: DifficultyAdjustment,
        reason: String,
    },
    Starter { difficulty_score: f64, reason: String },
    NoRecommendation { difficulty_score: f64, reason: String },
}

impl PracticeItem {
    pub fn diagnostic() -> Self {
        Self::Diagnostic {
            message: DIAGNOSTIC_MESSAGE.to_string(),
        }
    }

    pub fn concept_id(&self) -> Option<&str> {
        match self {
            Self::Practice(target) => Some(&target.concept_id),
            Self::Adjusted { concept_id, .. } => Some(concept_id),
            _ => None,
        }
    }

    pub fn difficulty_score(&self) -> Option<f64> {
        match self {
            Self::Diagnostic { .. } => None,
            Self::Practice(target) => Some(target.difficulty_score),
            Self::Adjusted {
                difficulty_score, ..
            }
            | Self::Starter {
                difficulty_score, ..
            }
            | Self::NoRecommendation {
                difficulty_score, ..
            } => Some(*difficulty_score),
        }
    }

    pub fn is_diagnostic(&self) -> bool {
        matches!(self, Self::Diagnostic { .. })
    }
}

fn default_difficulty() -> f64 {
    COLD_START_DIFFICULTY
}

/// One answered question from the current sitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEntry {
    pub concept_id: String,
    #[serde(default = "default_difficulty")]
    pub difficulty_score: f64,
    pub is_correct: bool,
}

fn validate_queue_request(target_questions: usize, mix_ratio: f64) -> Result<(), MasteryError> {
    if target_questions == 0 {
        return Err(MasteryError::InvalidInput(
            "target_questions must be at least 1".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&mix_ratio) {
        return Err(MasteryError::InvalidInput(format!(
            "mix_ratio must be within [0, 1], got {mix_ratio}"
        )));
    }
    Ok(())
}

/// Greedy queue over weak, due and mastered records, in that order.
///
/// Partitions keep the order given in `records` and are not deduplicated
/// against each other, so a weak record that also needs review can appear twice.
pub fn compose_queue(
    records: &[MasteryRecord],
    target_questions: usize,
    mix_ratio: f64,
) -> Vec<PracticeItem> {
    if records.is_empty() {
        return vec![PracticeItem::diagnostic()];
    }

    let weak_count = (target_questions as f64 * mix_ratio).floor() as usize;
    let review_count = target_questions.saturating_sub(weak_count);

    let take = move |category: PracticeCategory, count: usize| {
        records
            .iter()
            .filter(move |record| category.matches(record))
            .take(count)
            .map(move |record| {
                PracticeItem::Practice(PracticeTarget::from_record(category, record))
            })
    };

    // A record lands in at most two partitions (weak or mastered, plus review).
    let bound = target_questions.min(records.len().saturating_mul(2));
    let mut queue: Vec<PracticeItem> = Vec::with_capacity(bound);
    queue.extend(take(PracticeCategory::Weak, weak_count));
    queue.extend(take(PracticeCategory::Review, review_count));

    let remaining = target_questions.saturating_sub(queue.len());
    queue.extend(take(PracticeCategory::Mastered, remaining));
    queue
}

pub async fn build_session(
    store: &dyn MasteryStore,
    session_id: &str,
    target_questions: usize,
    mix_ratio: f64,
) -> Result<Vec<PracticeItem>, MasteryError> {
    require_id("session_id", session_id)?;
    validate_queue_request(target_questions, mix_ratio)?;

    let records = store.list(session_id).await?;
    let queue = compose_queue(&records, target_questions, mix_ratio);
    tracing::debug!(
        session_id,
        records = records.len(),
        target_questions,
        queued = queue.len(),
        "practice session built"
    );
    Ok(queue)
}

/// Picks the next question: stay on the last concept while a streak calls for
/// a difficulty change, otherwise take the head of a one-question session.
pub async fn recommend_next(
    store: &dyn MasteryStore,
    session_id: &str,
    recent_performance: &[PerformanceEntry],
    mix_ratio: f64,
) -> Result<PracticeItem, MasteryError> {
    require_id("session_id", session_id)?;

    let Some(last) = recent_performance.last() else {
        return Ok(PracticeItem::Starter {
            difficulty_score: COLD_START_DIFFICULTY,
            reason: "Starting assessment".to_string(),
        });
    };
    if !last.difficulty_score.is_finite() {
        return Err(MasteryError::InvalidInput(format!(
            "difficulty_score must be finite, got {}",
            last.difficulty_score
        )));
    }

    let window_start = recent_performance.len().saturating_sub(RECOMMENDATION_WINDOW);
    let recent_results: Vec<bool> = recent_performance[window_start..]
        .iter()
        .map(|entry| entry.is_correct)
        .collect();

    if let Some(adjustment) = detect_streak_adjustment(&recent_results) {
        let nudged = match adjustment {
            DifficultyAdjustment::Increase => last.difficulty_score + STREAK_NUDGE,
            DifficultyAdjustment::Decrease => last.difficulty_score - STREAK_NUDGE,
        };
        let difficulty_score = nudged.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);
        tracing::debug!(
            session_id,
            concept_id = %last.concept_id,
            adjustment = adjustment.as_str(),
            difficulty_score,
            "streak adjustment"
        );
        return Ok(PracticeItem::Adjusted {
            concept_id: last.concept_id.clone(),
            difficulty_score,
            adjustment,
            reason: format!("Adjusting difficulty ({})", adjustment.as_str()),
        });
    }

    let queue = build_session(store, session_id, 1, mix_ratio).await?;
    Ok(queue
        .into_iter()
        .next()
        .unwrap_or_else(|| PracticeItem::NoRecommendation {
            difficulty_score: COLD_START_DIFFICULTY,
            reason: "No recommendations available".to_string(),
        }))
}
