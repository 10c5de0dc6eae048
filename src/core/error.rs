//! Error types for rate acquisition and storage

use thiserror::Error;

/// Errors surfaced by providers, the fiat chain, the orchestrator and the store.
#[derive(Debug, Error)]
pub enum RateError {
    /// Network unreachable, timeout or a body that could not be read.
    #[error("Request error for {provider}: {message}")]
    Transport { provider: String, message: String },

    /// The provider answered with a non-success status.
    #[error("HTTP error: {status} from {provider}")]
    HttpStatus { provider: String, status: u16 },

    /// The payload does not match the provider's known schema.
    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Every fiat provider in the chain failed and none ever returned data.
    #[error("No provider reachable")]
    NoProviderReachable,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RateError {
    pub fn transport(provider: &str, err: impl std::fmt::Display) -> Self {
        RateError::Transport {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }

    pub fn malformed(provider: &str, err: impl std::fmt::Display) -> Self {
        RateError::MalformedResponse {
            provider: provider.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<fjall::Error> for RateError {
    fn from(err: fjall::Error) -> Self {
        RateError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RateError {
    fn from(err: serde_json::Error) -> Self {
        RateError::Storage(err.to_string())
    }
}

pub type RateResult<T> = Result<T, RateError>;
