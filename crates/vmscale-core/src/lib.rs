//! vmscale-core: shared types for the vmscale resource-lifecycle orchestrator.
//!
//! # Components
//!
//! - **`types`**: resource categories, handles, lifecycle states and the
//!   declarative `*Spec` inputs handed to a provider
//! - **`registry`**: `ResourceRegistry`, the per-run record teardown consumes
//! - **`graph`**: `DependencyGraph`, the static order between categories
//! - **`config`**: JSON run configuration
//! - **`time`** / **`wait`**: injectable clock and bounded poll loops
//!
//! # Invariant
//!
//! Every resource that exists provider-side for a run is registered before
//! any fallible operation runs against it. Provisioning code registers a
//! handle right after the create call returns and only then waits for
//! readiness, so teardown can always find it.

pub mod config;
pub mod error;
pub mod graph;
pub mod registry;
pub mod time;
pub mod types;
pub mod wait;

pub use config::{RunConfig, WaitSettings};
pub use error::{ConfigError, ProviderError, ProviderResult, WaitError};
pub use graph::DependencyGraph;
pub use registry::ResourceRegistry;
pub use time::{Clock, ManualClock, SystemClock};
pub use types::*;
pub use wait::{Probe, Transient, WaitPolicy, retry_transient, wait_until};
