//! vmscale-teardown: dependency-ordered, best-effort resource deletion.
//!
//! ```text
//! MetricAlarm → ScalingPolicy → ScalingGroup (wait drained) → LaunchTemplate
//!   → LoadBalancer (wait deleted) → TargetGroup
//!   → ComputeInstance (terminate all, then wait each)
//!   → NetworkRuleSet (after a grace period if compute went away)
//! ```
//!
//! The sequencer never stops early. Handles leave the registry only once
//! deleted, so running it again retries exactly what is left.

pub mod report;
pub mod sequencer;

pub use report::{TeardownFailure, TeardownReport};
pub use sequencer::TeardownSequencer;
