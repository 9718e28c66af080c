use guildmerit_core::AdapterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Invalid timestamp in column {0}: {1}")]
    InvalidTimestamp(&'static str, String),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for AdapterError {
    fn from(err: DbError) -> Self {
        AdapterError::Storage(err.to_string())
    }
}
