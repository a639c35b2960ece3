pub mod config;
pub mod db;
pub mod logging;
pub mod services;
pub mod state;

pub use config::{Config, EngineConfig};
pub use db::{MasteryRecord, MasteryStore, MemoryStore, SqliteStore, StoreError};
pub use services::mastery::{AnswerEvent, LearningProgress, MasterySummary};
pub use services::practice_queue::{PerformanceEntry, PracticeItem};
pub use services::MasteryError;
pub use state::MasteryEngine;
