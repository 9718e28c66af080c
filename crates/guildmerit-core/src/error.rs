use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Audit rendering error: {0}")]
    AuditRender(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Error surfaced by an adapter behind one of the capability traits in [`crate::ports`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Code host error: {0}")]
    CodeHost(String),

    #[error("Chat platform error: {0}")]
    Chat(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Report sink error: {0}")]
    Report(String),
}

pub type AdapterResult<T> = Result<T, AdapterError>;
