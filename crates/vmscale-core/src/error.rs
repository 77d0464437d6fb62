//! Error types shared across vmscale crates.

use thiserror::Error;

/// Result type alias for provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors reported by a `CloudProvider`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Permanent: quota, permission or validation failure.
    #[error("provider rejected request: {0}")]
    Rejected(String),

    /// Transient: throttling, connectivity, 5xx.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

/// Errors from [`wait_until`](crate::wait::wait_until).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WaitError<E> {
    #[error("gave up waiting for {what} after {attempts} attempts")]
    Exhausted { what: String, attempts: u32 },

    #[error("permanent failure while waiting: {0}")]
    Aborted(E),
}

/// Errors loading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
