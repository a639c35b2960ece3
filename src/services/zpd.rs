use serde::{Deserialize, Serialize};

use crate::db::{MasteryRecord, MasteryStore};
use crate::services::MasteryError;

pub const MIN_DIFFICULTY: f64 = 0.2;
pub const MAX_DIFFICULTY: f64 = 1.0;
pub const COLD_START_DIFFICULTY: f64 = 0.5;

const MIN_ATTEMPTS_FOR_ADJUSTMENT: u32 = 3;
// Goldilocks band: success rates inside it leave difficulty untouched.
const TARGET_SUCCESS_RATE_MIN: f64 = 0.70;
const TARGET_SUCCESS_RATE_MAX: f64 = 0.85;
const DIFFICULTY_STEP: f64 = 0.15;

const CONSECUTIVE_CORRECT_THRESHOLD: usize = 3;
const CONSECUTIVE_WRONG_THRESHOLD: usize = 2;

const EASY_CEILING: f64 = 0.4;
const MEDIUM_CEILING: f64 = 0.7;

const ZPD_LOWER_OFFSET: f64 = 0.05;
const ZPD_UPPER_OFFSET: f64 = 0.20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyAdjustment {
    Increase,
    Decrease,
}

impl DifficultyAdjustment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Increase => "increase",
            Self::Decrease => "decrease",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLabel {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZpdRange {
    pub min: f64,
    pub max: f64,
}

/// Target difficulty for a concept given its record, in `[0.2, 1.0]`.
///
/// Below three attempts there is too little evidence and the cold-start value
/// is used. Afterwards the success rate moves difficulty one step up or down
/// only when it leaves the 70-85% band.
pub fn difficulty_for_record(record: Option<&MasteryRecord>) -> f64 {
    let Some(record) = record else {
        return COLD_START_DIFFICULTY;
    };
    if record.questions_attempted < MIN_ATTEMPTS_FOR_ADJUSTMENT {
        return COLD_START_DIFFICULTY;
    }

    let level = if record.current_level.is_finite() {
        record.current_level
    } else {
        COLD_START_DIFFICULTY
    };
    let success_rate = record.success_rate();

    if success_rate > TARGET_SUCCESS_RATE_MAX {
        (level + DIFFICULTY_STEP).min(MAX_DIFFICULTY)
    } else if success_rate < TARGET_SUCCESS_RATE_MIN {
        (level - DIFFICULTY_STEP).max(MIN_DIFFICULTY)
    } else {
        level.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
    }
}

pub async fn current_difficulty(
    store: &dyn MasteryStore,
    session_id: &str,
    concept_id: &str,
) -> Result<f64, MasteryError> {
    let record = store.get(session_id, concept_id).await?;
    Ok(difficulty_for_record(record.as_ref()))
}

/// Short-term override from the newest answers (newest last).
pub fn detect_streak_adjustment(recent_results: &[bool]) -> Option<DifficultyAdjustment> {
    if recent_results.len() < CONSECUTIVE_CORRECT_THRESHOLD {
        return None;
    }

    let tail_correct = &recent_results[recent_results.len() - CONSECUTIVE_CORRECT_THRESHOLD..];
    if tail_correct.iter().all(|&correct| correct) {
        return Some(DifficultyAdjustment::Increase);
    }

    let tail_wrong = &recent_results[recent_results.len() - CONSECUTIVE_WRONG_THRESHOLD..];
    if tail_wrong.iter().all(|&correct| !correct) {
        return Some(DifficultyAdjustment::Decrease);
    }

    None
}

pub fn label(difficulty_score: f64) -> DifficultyLabel {
    if difficulty_score < EASY_CEILING {
        DifficultyLabel::Easy
    } else if difficulty_score < MEDIUM_CEILING {
        DifficultyLabel::Medium
    } else {
        DifficultyLabel::Hard
    }
}

/// Advisory selection band slightly above the current mastery level.
pub fn zpd_range(mastery_level: f64) -> ZpdRange {
    ZpdRange {
        min: (mastery_level + ZPD_LOWER_OFFSET).min(MAX_DIFFICULTY),
        max: (mastery_level + ZPD_UPPER_OFFSET).min(MAX_DIFFICULTY),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyAssessment {
    pub concept_id: String,
    pub difficulty_score: f64,
    pub difficulty_label: DifficultyLabel,
}

pub async fn assess_difficulty(
    store: &dyn MasteryStore,
    session_id: &str,
    concept_id: &str,
) -> Result<DifficultyAssessment, MasteryError> {
    let difficulty_score = current_difficulty(store, session_id, concept_id).await?;
    tracing::debug!(session_id, concept_id, difficulty_score, "difficulty assessed");
    Ok(DifficultyAssessment {
        concept_id: concept_id.to_string(),
        difficulty_score,
        difficulty_label: label(difficulty_score),
    })
}
