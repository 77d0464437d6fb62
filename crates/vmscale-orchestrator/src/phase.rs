//! Run phase state machine.
//!
//! ```text
//! Init → Provisioning → [Warmup] → Running → Complete → Teardown → Done
//!   └──────────────┴──────────┴─────────┴──── any error ──→ Teardown
//! ```

use std::fmt;

use tracing::info;

use crate::error::{RunError, RunResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Provisioning,
    Warmup,
    Running,
    Complete,
    Teardown,
    Done,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::Provisioning => "provisioning",
            RunPhase::Warmup => "warmup",
            RunPhase::Running => "running",
            RunPhase::Complete => "complete",
            RunPhase::Teardown => "teardown",
            RunPhase::Done => "done",
        }
    }

    /// Forward transitions reachable without an error.
    fn allows(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (RunPhase::Init, RunPhase::Provisioning)
                | (RunPhase::Provisioning, RunPhase::Warmup)
                | (RunPhase::Provisioning, RunPhase::Running)
                | (RunPhase::Warmup, RunPhase::Running)
                | (RunPhase::Running, RunPhase::Complete)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase plus every phase entered so far.
#[derive(Debug, Clone)]
pub struct PhaseTracker {
    history: Vec<RunPhase>,
}

impl Default for PhaseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self {
            history: vec![RunPhase::Init],
        }
    }

    pub fn current(&self) -> RunPhase {
        self.history.last().copied().unwrap_or(RunPhase::Init)
    }

    pub fn history(&self) -> &[RunPhase] {
        &self.history
    }

    /// Move forward along the success path.
    pub fn advance(&mut self, next: RunPhase) -> RunResult<()> {
        let from = self.current();
        if !from.allows(next) {
            return Err(RunError::PhaseTransition { from, to: next });
        }
        self.enter(next);
        Ok(())
    }

    /// Enter teardown from wherever the run stopped. Entering twice is
    /// ignored.
    pub fn begin_teardown(&mut self) {
        if !matches!(self.current(), RunPhase::Teardown | RunPhase::Done) {
            self.enter(RunPhase::Teardown);
        }
    }

    pub fn finish(&mut self) {
        if self.current() == RunPhase::Teardown {
            self.enter(RunPhase::Done);
        }
    }

    fn enter(&mut self, next: RunPhase) {
        info!(from = %self.current(), to = %next, "run phase");
        self.history.push(next);
    }
}
