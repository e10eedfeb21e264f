//! Engine error types

use std::time::Duration;

/// Errors raised by the signal engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Weight maps, pool size or timeouts are unusable. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider unavailable ({provider}): {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("Evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
