//! Provisioning error types.

use thiserror::Error;

use vmscale_core::{ProviderError, ResourceCategory, WaitError};

/// Errors that can occur while creating resources.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("provider rejected {category}: {reason}")]
    Rejected {
        category: ResourceCategory,
        reason: String,
    },

    #[error("gave up waiting for {what} after {attempts} attempts")]
    WaitExhausted { what: String, attempts: u32 },

    #[error("{0} became ready without a public endpoint")]
    MissingEndpoint(String),
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    /// Transient provider errors are retried inside the wait until its
    /// bound runs out, so only permanent ones arrive as `Aborted`.
    pub(crate) fn from_wait(category: ResourceCategory, err: WaitError<ProviderError>) -> Self {
        match err {
            WaitError::Exhausted { what, attempts } => {
                ProvisionError::WaitExhausted { what, attempts }
            }
            WaitError::Aborted(
                ProviderError::Rejected(reason) | ProviderError::Unavailable(reason),
            ) => ProvisionError::Rejected { category, reason },
        }
    }

    /// Whether the failure is a permanent provider rejection.
    pub fn is_rejected(&self) -> bool {
        matches!(self, ProvisionError::Rejected { .. })
    }
}
