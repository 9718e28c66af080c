use guildmerit_core::AdapterError;
use thiserror::Error;

/// GitHub crate error types
#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub API error: {0}")]
    ApiError(String),

    #[error("Invalid GitHub configuration: {0}")]
    ConfigError(String),

    #[error("Octocrab error: {0}")]
    OctocrabError(#[from] octocrab::Error),
}

pub type GithubResult<T> = Result<T, GithubError>;

impl From<GithubError> for AdapterError {
    fn from(err: GithubError) -> Self {
        AdapterError::CodeHost(err.to_string())
    }
}
