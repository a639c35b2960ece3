use serde::{Deserialize, Serialize};

pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EXPECTED_TIME_SECONDS: f64 = 60.0;
pub const MAX_QUALITY: u8 = 5;
/// Qualities below this count as a lapse and restart the repetition ladder.
pub const PASSING_QUALITY: u8 = 3;
const MAX_INTERVAL_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sm2State {
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
}

impl Default for Sm2State {
    fn default() -> Self {
        Self {
            ease_factor: INITIAL_EASE_FACTOR,
            interval_days: 1,
            repetitions: 0,
        }
    }
}

/// Maps an answer to an SM-2 response quality in `0..=5`.
///
/// 5 fast and correct, 4 correct at normal pace, 3 correct but slow or
/// hinted, 1 wrong, 0 wrong after more than twice the expected time.
pub fn score_quality(
    is_correct: bool,
    time_taken_seconds: f64,
    expected_time_seconds: f64,
    had_hint: bool,
) -> u8 {
    let expected = if expected_time_seconds.is_finite() && expected_time_seconds > 0.0 {
        expected_time_seconds
    } else {
        DEFAULT_EXPECTED_TIME_SECONDS
    };

    if !is_correct {
        return if time_taken_seconds > expected * 2.0 { 0 } else { 1 };
    }

    if had_hint {
        return 3;
    }

    let time_ratio = time_taken_seconds / expected;
    if time_ratio < 0.5 {
        5
    } else if time_ratio < 1.0 {
        4
    } else {
        3
    }
}

pub fn next_ease_factor(quality: u8, ease_factor: f64) -> f64 {
    let miss = f64::from(MAX_QUALITY - quality.min(MAX_QUALITY));
    let updated = ease_factor + (0.1 - miss * (0.08 + miss * 0.02));
    if updated.is_nan() {
        return MIN_EASE_FACTOR;
    }
    updated.max(MIN_EASE_FACTOR)
}

/// One SM-2 step: new ease, interval and repetition count for `quality`.
pub fn update_parameters(quality: u8, state: Sm2State) -> Sm2State {
    let ease_factor = next_ease_factor(quality, state.ease_factor);

    if quality < PASSING_QUALITY {
        return Sm2State {
            ease_factor,
            interval_days: 1,
            repetitions: 0,
        };
    }

    let repetitions = state.repetitions.saturating_add(1);
    let interval_days = match repetitions {
        1 => 1,
        2 => 6,
        _ => {
            let scaled = (f64::from(state.interval_days) * ease_factor).floor();
            scaled.clamp(1.0, f64::from(MAX_INTERVAL_DAYS)) as u32
        }
    };

    Sm2State {
        ease_factor,
        interval_days,
        repetitions,
    }
}
