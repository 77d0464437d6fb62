//! vmscale-orchestrator: drives one provisioning + load-test run.
//!
//! # Architecture
//!
//! ```text
//! Orchestrator::run(scenario)
//!   └── RunContext (config, provider, clock, registry, phases)
//!         ├── ResourceProvisioner   builds the registry
//!         ├── TestSessionDriver     starts and polls the load test
//!         ├── ScalingController     turns polls into scale-outs
//!         └── TeardownSequencer     always runs, exactly once
//! ```
//!
//! A run either completes or stops at its first fatal error; in both
//! cases teardown consumes whatever the registry holds at that moment.

mod autoscaling;
pub mod context;
pub mod error;
mod horizontal;
pub mod orchestrator;
pub mod phase;
pub mod report;

pub use context::RunContext;
pub use error::{RunError, RunResult};
pub use orchestrator::Orchestrator;
pub use phase::{PhaseTracker, RunPhase};
pub use report::{RunReport, RunSummary, Scenario};
