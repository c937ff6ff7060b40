//! Error types for the tutor library.

/// Errors from the chat client, the speech adapter and configuration.
#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("API key not configured (set GEMINI_API_KEY or API_KEY)")]
    MissingApiKey,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("server error: {0}")]
    Server(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model returned no text")]
    EmptyResponse,
    #[error("background task failed: {0}")]
    Task(String),
    #[error("speech engine unavailable: {0}")]
    SpeechUnavailable(String),
    #[error("speech error: {0}")]
    Speech(String),
}

impl TutorError {
    /// Map a non-success status and its message to the matching variant.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            400 => TutorError::InvalidRequest(message),
            401 | 403 => TutorError::Auth(message),
            429 => TutorError::RateLimited(message),
            500..=599 => TutorError::Server(message),
            _ => TutorError::Api { status, message },
        }
    }
}
