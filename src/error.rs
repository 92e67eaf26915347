//! Error types surfaced by the enrichment core.

use thiserror::Error;

/// Errors produced by the provider client layer.
///
/// `RateLimited` and `Transient` are retried inside the clients; callers only
/// observe them once retries are exhausted. `NotFound` is not a failure mode:
/// clients cache it as a negative result and adapters turn it into an empty
/// response.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 429 (or a provider-specific equivalent such as iTunes' 403) after
    /// retries and the provider-wide cooldown were exhausted.
    #[error("rate limited by provider (retry after: {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// Network-level failure or timeout after bounded retries.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider confirmed the requested entity does not exist.
    #[error("provider confirmed not found")]
    NotFound,

    /// Non-retryable provider response.
    #[error("provider error: status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// Credential or token failure that a retry cannot fix.
    #[error("provider authentication failure: {0}")]
    AuthFailure(String),

    /// Payload did not match the expected shape.
    #[error("failed to parse provider payload: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound)
    }

    /// Classify a reqwest transport error.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProviderError::Transient(err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Transient(err.to_string())
        }
    }
}

/// Seed-level pipeline failures. Per-recording errors are collected into the
/// import summary instead of aborting; these are the conditions that stop a
/// whole seed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("song not found: {0}")]
    SongNotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("database connection failed")]
    DatabaseConnectionFailed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_not_retryable_surface() {
        let err = ProviderError::NotFound;
        assert!(err.is_not_found());
        assert!(!ProviderError::Transient("timeout".into()).is_not_found());
    }
}
