use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::sm2::{Sm2State, INITIAL_EASE_FACTOR};

/// Per-(session, concept) mastery and spaced-repetition state.
///
/// `session_id` is an opaque key grouping anonymous attempts; it is not a user
/// identity. A record is created on the first answer for its pair and is only
/// mutated through the scheduler and aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasteryRecord {
    pub id: String,
    pub session_id: String,
    pub concept_id: String,
    pub current_level: f64,
    pub questions_attempted: u32,
    pub questions_correct: u32,
    pub streak_current: u32,
    pub streak_best: u32,
    pub first_attempt_date: DateTime<Utc>,
    pub last_practiced: DateTime<Utc>,
    pub next_review_due: DateTime<Utc>,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    /// Exponential moving average of seconds spent on correct answers.
    pub avg_time_to_correct: Option<f64>,
    pub mastery_achieved_date: Option<DateTime<Utc>>,
    pub is_mastered: bool,
    pub needs_review: bool,
    pub updated_at: DateTime<Utc>,
}

impl MasteryRecord {
    pub fn new(
        session_id: impl Into<String>,
        concept_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let sm2 = Sm2State::default();
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            concept_id: concept_id.into(),
            current_level: 0.0,
            questions_attempted: 0,
            questions_correct: 0,
            streak_current: 0,
            streak_best: 0,
            first_attempt_date: now,
            last_practiced: now,
            next_review_due: now + Duration::days(i64::from(sm2.interval_days)),
            ease_factor: INITIAL_EASE_FACTOR,
            interval_days: sm2.interval_days,
            repetitions: sm2.repetitions,
            avg_time_to_correct: None,
            mastery_achieved_date: None,
            is_mastered: false,
            needs_review: false,
            updated_at: now,
        }
    }

    pub fn sm2_state(&self) -> Sm2State {
        Sm2State {
            ease_factor: self.ease_factor,
            interval_days: self.interval_days,
            repetitions: self.repetitions,
        }
    }

    pub fn is_due(&self, as_of: DateTime<Utc>) -> bool {
        self.next_review_due <= as_of
    }

    /// Fraction of attempts answered correctly, 0.0 before any attempt.
    pub fn success_rate(&self) -> f64 {
        if self.questions_attempted == 0 {
            return 0.0;
        }
        f64::from(self.questions_correct) / f64::from(self.questions_attempted)
    }
}
