//! Error types for update ingestion

use thiserror::Error;

/// Result type for session lifecycle operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Misuse of the session lifecycle
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session already configured: {0} was set before")]
    AlreadyConfigured(&'static str),

    #[error("Session is missing configuration: {0}")]
    MissingConfiguration(&'static str),

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session is not running")]
    NotRunning,

    #[error("No tokio runtime available to start the session")]
    NoRuntime,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build update source: {0}")]
    Source(#[from] PollError),
}

/// Failure of a single poll; the session backs off and retries
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API error (status {status:?}): {description}")]
    Api {
        status: Option<u16>,
        description: String,
    },

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl PollError {
    pub fn api_status(status: u16, description: impl Into<String>) -> Self {
        PollError::Api {
            status: Some(status),
            description: description.into(),
        }
    }
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the bot token.
        PollError::Transport(err.without_url())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            SessionError::AlreadyConfigured("token").to_string(),
            "Session already configured: token was set before"
        );
        assert_eq!(
            PollError::api_status(401, "Unauthorized").to_string(),
            "API error (status Some(401)): Unauthorized"
        );
    }
}
