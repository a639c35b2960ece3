use std::sync::Arc;

use mastery_engine::config::Config;
use mastery_engine::db::SqliteStore;
use mastery_engine::logging;
use mastery_engine::state::MasteryEngine;

/// Applies the schema to the configured database and prints the learning
/// progress of every session id passed as an argument.
#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config.log_level);

    let store = match SqliteStore::open(&config.db_path).await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(
                error = %err,
                path = %config.db_path.display(),
                "failed to open mastery database"
            );
            std::process::exit(1);
        }
    };
    tracing::info!(path = %config.db_path.display(), "mastery database ready");

    let engine = MasteryEngine::new(Arc::new(store), config.engine.clone());

    let mut failed = false;
    for session_id in std::env::args().skip(1) {
        let progress = match engine.learning_progress(&session_id).await {
            Ok(progress) => progress,
            Err(err) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %err,
                    "failed to load learning progress"
                );
                failed = true;
                continue;
            }
        };

        let report = serde_json::json!({
            "session_id": session_id,
            "progress": progress,
        });
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{text}"),
            Err(err) => {
                tracing::error!(
                    session_id = %session_id,
                    error = %err,
                    "failed to encode progress"
                );
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
