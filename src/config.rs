use std::path::PathBuf;

use crate::logging::DEFAULT_LOG_FILTER;
use crate::services::practice_queue::{DEFAULT_MIX_RATIO, DEFAULT_TARGET_QUESTIONS};
use crate::services::sm2::DEFAULT_EXPECTED_TIME_SECONDS;

const DEFAULT_PROGRESS_REVIEW_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: PathBuf,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let db_path = std::env::var("MASTERY_DB_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        Self {
            log_level,
            db_path,
            engine: EngineConfig::from_env(),
        }
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mastery-engine")
        .join("mastery.db")
}

/// Tunables for the scheduling and queueing entry points.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Time a learner is expected to need per question; drives SM-2 quality scoring.
    pub expected_time_seconds: f64,
    pub default_target_questions: usize,
    pub default_mix_ratio: f64,
    /// Upper bound on due records counted by the progress report.
    pub progress_review_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            expected_time_seconds: DEFAULT_EXPECTED_TIME_SECONDS,
            default_target_questions: DEFAULT_TARGET_QUESTIONS,
            default_mix_ratio: DEFAULT_MIX_RATIO,
            progress_review_limit: DEFAULT_PROGRESS_REVIEW_LIMIT,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let expected_time_seconds = env_parse::<f64>("MASTERY_EXPECTED_TIME_SECONDS")
            .filter(|value| value.is_finite() && *value > 0.0)
            .unwrap_or(defaults.expected_time_seconds);

        let default_target_questions = env_parse::<usize>("MASTERY_DEFAULT_TARGET_QUESTIONS")
            .filter(|value| *value > 0)
            .unwrap_or(defaults.default_target_questions);

        let default_mix_ratio = env_parse::<f64>("MASTERY_DEFAULT_MIX_RATIO")
            .filter(|value| (0.0..=1.0).contains(value))
            .unwrap_or(defaults.default_mix_ratio);

        let progress_review_limit = env_parse::<usize>("MASTERY_PROGRESS_REVIEW_LIMIT")
            .unwrap_or(defaults.progress_review_limit);

        Self {
            expected_time_seconds,
            default_target_questions,
            default_mix_ratio,
            progress_review_limit,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_scheduler_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.expected_time_seconds, 60.0);
        assert_eq!(config.default_target_questions, 20);
        assert!((config.default_mix_ratio - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.progress_review_limit, 100);
    }

    #[test]
    fn default_db_path_ends_with_file_name() {
        let path = default_db_path();
        assert!(path.ends_with("mastery-engine/mastery.db"));
    }
}
