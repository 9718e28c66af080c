use guildmerit_core::AdapterError;
use thiserror::Error;

/// Discord crate error types
#[derive(Debug, Error)]
pub enum DiscordError {
    #[error("Discord request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Discord permission denied: {0}")]
    PermissionDenied(String),

    #[error("Discord role not found: {0}")]
    RoleNotFound(String),

    #[error("Discord API error: HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Invalid Discord configuration: {0}")]
    ConfigError(String),
}

pub type DiscordResult<T> = Result<T, DiscordError>;

impl From<DiscordError> for AdapterError {
    fn from(err: DiscordError) -> Self {
        match err {
            DiscordError::PermissionDenied(msg) => AdapterError::PermissionDenied(msg),
            other => AdapterError::Chat(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_keeps_its_kind() {
        let err: AdapterError = DiscordError::PermissionDenied("HTTP 403".to_string()).into();
        assert_eq!(err, AdapterError::PermissionDenied("HTTP 403".to_string()));

        let err: AdapterError = DiscordError::RoleNotFound("Maintainer".to_string()).into();
        assert!(matches!(err, AdapterError::Chat(msg) if msg.contains("Maintainer")));
    }
}
