//! Load-generator client errors.

use thiserror::Error;
use vmscale_core::{Transient, WaitError};

pub type LoadGenResult<T> = Result<T, LoadGenError>;

#[derive(Debug, Error)]
pub enum LoadGenError {
    /// The load generator answered with something we cannot interpret.
    #[error("load generator protocol error: {0}")]
    Protocol(String),

    /// Connection refused, reset or timed out. Retried locally.
    #[error("load generator unreachable: {0}")]
    Transport(String),

    #[error("gave up waiting for {what} after {attempts} attempts")]
    WaitExhausted { what: String, attempts: u32 },

    #[error("failed to write test log: {0}")]
    Io(#[from] std::io::Error),
}

impl Transient for LoadGenError {
    fn is_transient(&self) -> bool {
        matches!(self, LoadGenError::Transport(_))
    }
}

impl From<WaitError<LoadGenError>> for LoadGenError {
    fn from(err: WaitError<LoadGenError>) -> Self {
        match err {
            WaitError::Exhausted { what, attempts } => LoadGenError::WaitExhausted { what, attempts },
            WaitError::Aborted(e) => e,
        }
    }
}
