pub mod mastery;
pub mod practice_queue;
pub mod sm2;
pub mod zpd;

use crate::db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum MasteryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) fn require_id(field: &str, value: &str) -> Result<(), MasteryError> {
    if value.trim().is_empty() {
        return Err(MasteryError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(())
}
