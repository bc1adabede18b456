// src/infra/errors.rs — Error types for Engram

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngramError {
    // Caller errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Provider errors
    #[error("Provider '{provider}' is currently unavailable")]
    Unavailable { provider: String },

    #[error("Provider '{provider}' request timed out")]
    Timeout { provider: String },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Provider '{provider}' rejected the API key (missing, invalid, or placeholder)")]
    AuthFailure { provider: String },

    #[error("Provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    #[error("All providers failed. Last error: {last_error}")]
    AllProvidersFailed { last_error: String },

    // Infra
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngramError {
    /// Whether retrying the same request later could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EngramError::RateLimited { .. }
                | EngramError::Timeout { .. }
                | EngramError::Unavailable { .. }
        )
    }
}
