//! Scaling controller interface.

use chrono::{DateTime, Utc};

/// A scaling decision for one evaluation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    /// Add this many instances.
    ScaleOut(u32),
    /// Remove this many instances.
    ScaleIn(u32),
    /// No change needed.
    NoOp,
}

impl ScalingDecision {
    /// Instance count carried by the decision, zero for `NoOp`.
    pub fn magnitude(&self) -> u32 {
        match self {
            ScalingDecision::ScaleOut(n) | ScalingDecision::ScaleIn(n) => *n,
            ScalingDecision::NoOp => 0,
        }
    }
}

/// What the controller sees on each tick, taken from the latest test poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub now: DateTime<Utc>,
    /// Most recent requests-per-second sample.
    pub throughput: f64,
    pub test_complete: bool,
}

/// A scaling strategy evaluated once per poll of the running test.
pub trait ScalingController: Send {
    /// Short strategy name for logs.
    fn name(&self) -> &'static str;

    /// Decide what to do this tick. May update internal state
    /// (e.g. the time of the last action).
    fn evaluate(&mut self, observation: &Observation) -> ScalingDecision;
}
