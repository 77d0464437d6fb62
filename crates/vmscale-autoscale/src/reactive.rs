//! Reactive time-window heuristic.
//!
//! Adds capacity purely on elapsed wall-clock time: once more than
//! `window` has passed since the last scaling action (or the test start),
//! and the test is still running, scale out by `step` and restart the
//! window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::controller::{Observation, ScalingController, ScalingDecision};

/// Time-window scale-out controller.
#[derive(Debug, Clone)]
pub struct ReactiveTimeWindow {
    window: Duration,
    step: u32,
    last_action: DateTime<Utc>,
}

impl ReactiveTimeWindow {
    /// Start the window at `started_at`, usually the test's start time.
    pub fn new(window: Duration, started_at: DateTime<Utc>) -> Self {
        Self {
            window,
            step: 1,
            last_action: started_at,
        }
    }

    /// Instances added per scale-out (default 1).
    pub fn with_step(mut self, step: u32) -> Self {
        self.step = step.max(1);
        self
    }

    /// The decision for a given time since the last action.
    ///
    /// Pure; `elapsed` must strictly exceed `window`.
    pub fn decide(
        elapsed: Duration,
        test_complete: bool,
        window: Duration,
        step: u32,
    ) -> ScalingDecision {
        if !test_complete && elapsed > window {
            ScalingDecision::ScaleOut(step)
        } else {
            ScalingDecision::NoOp
        }
    }

    /// Evaluate at `now` and restart the window on scale-out.
    pub fn tick(&mut self, now: DateTime<Utc>, test_complete: bool) -> ScalingDecision {
        // A start time ahead of the local clock counts as no time elapsed.
        let elapsed = (now - self.last_action).to_std().unwrap_or_default();
        let decision = Self::decide(elapsed, test_complete, self.window, self.step);

        if let ScalingDecision::ScaleOut(n) = decision {
            debug!(
                elapsed_secs = elapsed.as_secs(),
                window_secs = self.window.as_secs(),
                add = n,
                "time window elapsed, scaling out"
            );
            self.last_action = now;
        }
        decision
    }

    pub fn last_action(&self) -> DateTime<Utc> {
        self.last_action
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

impl ScalingController for ReactiveTimeWindow {
    fn name(&self) -> &'static str {
        "reactive_time_window"
    }

    fn evaluate(&mut self, observation: &Observation) -> ScalingDecision {
        self.tick(observation.now, observation.test_complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        start() + chrono::Duration::seconds(secs)
    }

    #[test]
    fn tick_sequence_resets_on_scale_out() {
        let mut controller = ReactiveTimeWindow::new(Duration::from_secs(100), start());

        let decisions: Vec<_> = [30, 60, 110, 150, 260]
            .into_iter()
            .map(|t| controller.tick(at(t), false))
            .collect();

        assert_eq!(
            decisions,
            vec![
                ScalingDecision::NoOp,
                ScalingDecision::NoOp,
                ScalingDecision::ScaleOut(1),
                ScalingDecision::NoOp,
                ScalingDecision::ScaleOut(1),
            ]
        );
        assert_eq!(controller.last_action(), at(260));
    }

    #[test]
    fn exactly_at_window_is_noop() {
        let window = Duration::from_secs(100);
        assert_eq!(
            ReactiveTimeWindow::decide(Duration::from_secs(100), false, window, 1),
            ScalingDecision::NoOp
        );
        assert_eq!(
            ReactiveTimeWindow::decide(Duration::from_millis(100_001), false, window, 1),
            ScalingDecision::ScaleOut(1)
        );
    }

    #[test]
    fn completed_test_never_scales() {
        let mut controller = ReactiveTimeWindow::new(Duration::from_secs(100), start());
        assert_eq!(controller.tick(at(500), true), ScalingDecision::NoOp);
        // No reset happened.
        assert_eq!(controller.last_action(), start());
    }

    #[test]
    fn start_time_in_the_future_is_noop() {
        let mut controller = ReactiveTimeWindow::new(Duration::from_secs(100), at(30));
        assert_eq!(controller.tick(start(), false), ScalingDecision::NoOp);
    }

    #[test]
    fn step_sets_magnitude() {
        let mut controller =
            ReactiveTimeWindow::new(Duration::from_secs(10), start()).with_step(3);
        let decision = controller.evaluate(&Observation {
            now: at(11),
            throughput: 120.0,
            test_complete: false,
        });
        assert_eq!(decision, ScalingDecision::ScaleOut(3));
        assert_eq!(decision.magnitude(), 3);
    }
}
