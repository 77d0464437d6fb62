//! Run outcome.

use std::fmt;

use vmscale_teardown::TeardownReport;

use crate::error::RunResult;
use crate::phase::RunPhase;

/// Which test a run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Horizontal,
    AutoScaling,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scenario::Horizontal => f.write_str("horizontal"),
            Scenario::AutoScaling => f.write_str("autoscaling"),
        }
    }
}

/// What a successful run observed.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub test_id: String,
    /// Web instances added by the local controller after the first one.
    pub instances_added: u32,
    pub final_throughput: f64,
}

#[derive(Debug)]
pub struct RunReport {
    pub scenario: Scenario,
    /// Success, or the first fatal error.
    pub outcome: RunResult<RunSummary>,
    pub teardown: TeardownReport,
    /// Every phase entered, ending in `Done`.
    pub phases: Vec<RunPhase>,
}

impl RunReport {
    /// Teardown failures do not affect this.
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}
