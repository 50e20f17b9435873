// src/infra/errors.rs — Error types for Archer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArcherError {
    // Call errors (absorbed at the call site)
    #[error("Provider '{provider}' error: {message}")]
    Provider {
        provider: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{provider}', retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: u64,
    },

    #[error("Provider '{provider}' returned no choices")]
    EmptyResponse { provider: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Call cancelled")]
    Cancelled,

    #[error("Could not parse model response: {0}")]
    Parse(String),

    // Loop errors
    #[error("Optimization failed: {0}")]
    Optimization(String),

    #[error("Circuit breaker open, try again in {retry_in_secs} seconds")]
    CircuitOpen { retry_in_secs: u64 },

    // Infra
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ArcherError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ArcherError::Provider {
                retriable: true,
                ..
            } | ArcherError::RateLimited { .. }
                | ArcherError::Timeout { .. }
        )
    }

    /// Errors raised by an external model call. These never travel past the
    /// component that issued the call.
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            ArcherError::Provider { .. }
                | ArcherError::RateLimited { .. }
                | ArcherError::EmptyResponse { .. }
                | ArcherError::Timeout { .. }
                | ArcherError::Cancelled
                | ArcherError::Parse(_)
        )
    }
}
