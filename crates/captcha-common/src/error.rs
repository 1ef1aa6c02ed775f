//! Common error types for the CAPTCHA API components.

use thiserror::Error;

/// Errors shared by the HTTP server and the task worker
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// Configuration error (missing or malformed keys)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Datastore connection/query error
    #[error("Database error: {0}")]
    Database(String),

    /// Task broker or result backend error
    #[error("Broker error: {0}")]
    Broker(String),

    /// No challenge exists with this id (or it was already used)
    #[error("CAPTCHA not found: {0}")]
    NotFound(String),

    /// Challenge exists but is past its validity window
    #[error("CAPTCHA expired: {0}")]
    Expired(String),

    /// Answer did not match
    #[error("Incorrect answer")]
    IncorrectAnswer,

    /// Invalid input/request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CaptchaError {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Config(_) => 500,
            Self::Database(_) => 503,
            Self::Broker(_) => 503,
            Self::NotFound(_) => 404,
            Self::Expired(_) => 410,
            Self::IncorrectAnswer => 400,
            Self::InvalidInput(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CaptchaError::NotFound("x".into()).status_code(), 404);
        assert_eq!(CaptchaError::Expired("x".into()).status_code(), 410);
        assert_eq!(CaptchaError::IncorrectAnswer.status_code(), 400);
        assert_eq!(CaptchaError::Database("down".into()).status_code(), 503);
    }
}
