//! ResourceRegistry: per-run record of every created resource.
//!
//! The registry is the single source of truth for teardown. Handles are
//! grouped by category and keep their insertion order within a category.
//! During a run the registry is append-only; only the teardown sequencer
//! removes handles, and only after their deletion succeeded.

use std::collections::BTreeMap;

use tracing::debug;

use crate::types::{ResourceCategory, ResourceHandle};

/// Category → ordered handles, owned by one run.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    entries: BTreeMap<ResourceCategory, Vec<ResourceHandle>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly created resource.
    ///
    /// Must be called before any fallible operation (readiness wait,
    /// follow-up configuration) is attempted on the resource.
    pub fn register(&mut self, handle: ResourceHandle) {
        debug!(category = %handle.category, id = %handle.id, "resource registered");
        self.entries.entry(handle.category).or_default().push(handle);
    }

    /// Handles of one category in insertion order.
    pub fn handles(&self, category: ResourceCategory) -> &[ResourceHandle] {
        self.entries
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, category: ResourceCategory, id: &str) -> bool {
        self.handles(category).iter().any(|h| h.id == id)
    }

    /// Drop a handle whose deletion has completed.
    ///
    /// Returns `false` if the handle was not registered.
    pub fn remove(&mut self, category: ResourceCategory, id: &str) -> bool {
        let Some(handles) = self.entries.get_mut(&category) else {
            return false;
        };
        let before = handles.len();
        handles.retain(|h| h.id != id);
        let removed = handles.len() != before;
        if handles.is_empty() {
            self.entries.remove(&category);
        }
        removed
    }

    /// Number of handles in one category.
    pub fn count(&self, category: ResourceCategory) -> usize {
        self.handles(category).len()
    }

    /// Total number of registered handles.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(Vec::is_empty)
    }

    /// Every registered handle, grouped by category in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceHandle> {
        self.entries.values().flatten()
    }
}
