//! Teardown outcome.

use std::fmt;

use vmscale_core::{ProviderError, ResourceHandle, WaitError};

/// A resource that could not be deleted. It stays in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownFailure {
    pub handle: ResourceHandle,
    pub error: WaitError<ProviderError>,
}

impl fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.handle, self.error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Deleted resources, in deletion order.
    pub deleted: Vec<ResourceHandle>,
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// True when every registered resource was deleted.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failures.len()
    }
}
