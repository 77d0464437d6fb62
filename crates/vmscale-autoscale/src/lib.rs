//! vmscale-autoscale: scaling strategies for a running load test.
//!
//! Two controllers share the [`ScalingController`] interface:
//!
//! ```text
//! ReactiveTimeWindow   elapsed since last action > window  → ScaleOut(step)
//!                      otherwise, or test complete          → NoOp
//!
//! ThresholdAlarm       CPU > upper for N periods → ScaleOutPolicy (provider)
//!                      CPU < lower for M periods → ScaleInPolicy  (provider)
//!                      local evaluate()          → NoOp
//! ```
//!
//! The reactive controller restarts its window on every scale-out.

pub mod alarm;
pub mod controller;
pub mod reactive;

pub use alarm::{AlarmRule, ThresholdAlarm};
pub use controller::{Observation, ScalingController, ScalingDecision};
pub use reactive::ReactiveTimeWindow;
