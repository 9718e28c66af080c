use guildmerit_core::{AdapterError, CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] CoreError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),
}

pub type EngineResult<T> = Result<T, EngineError>;
