//! Failure taxonomy surfaced to callers of the distance pipeline.

use thiserror::Error;

use crate::resolver::RunPhase;

/// Fallback text when a collaborator fails without a usable message.
pub const GENERIC_FAILURE: &str = "Distance calculation failed. Please try again.";

/// Errors produced by collaborator calls and the run itself.
///
/// Variants are produced where the failure is observed (HTTP status, error
/// code in the response body, transport error), never inferred later from
/// message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistanceError {
    /// The routing provider rejected its credential.
    #[error("routing provider credential was rejected")]
    TokenInvalid,
    /// The routing provider is overloaded.
    #[error("routing provider is rate limiting requests")]
    RateLimited,
    /// The caller lacks the distance-processing permission.
    #[error("not authorized to process distances")]
    Unauthorized,
    #[error("network error: {0}")]
    Network(String),
    /// The run budget ran out while the carried phase was in progress.
    #[error("distance run timed out during {0}")]
    TimedOut(RunPhase),
    #[error("{0}")]
    Generic(String),
}

impl DistanceError {
    pub fn generic(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            DistanceError::Generic(GENERIC_FAILURE.to_string())
        } else {
            DistanceError::Generic(message)
        }
    }

    /// Text suitable for showing to a dispatcher.
    pub fn user_message(&self) -> String {
        match self {
            DistanceError::TokenInvalid => {
                "The routing service rejected our credentials. Please contact support.".to_string()
            }
            DistanceError::RateLimited => {
                "The routing service is busy right now. Please try again in a few minutes."
                    .to_string()
            }
            DistanceError::Unauthorized => {
                "You do not have permission to calculate distances.".to_string()
            }
            DistanceError::Network(_) | DistanceError::TimedOut(_) => GENERIC_FAILURE.to_string(),
            DistanceError::Generic(message) => message.clone(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DistanceError::RateLimited | DistanceError::Network(_) | DistanceError::TimedOut(_)
        )
    }
}

impl From<reqwest::Error> for DistanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DistanceError::Generic(format!("malformed response: {}", err))
        } else {
            DistanceError::Network(err.to_string())
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
