//! Run entry point.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::FutureExt;
use tracing::{error, info, warn};

use vmscale_core::{Clock, RunConfig};
use vmscale_loadgen::LoadGenTransport;
use vmscale_provider::CloudProvider;

use crate::context::RunContext;
use crate::error::RunResult;
use crate::report::{RunReport, RunSummary, Scenario};
use crate::{autoscaling, horizontal};

/// Runs scenarios against one provider session.
pub struct Orchestrator {
    config: RunConfig,
    provider: Arc<dyn CloudProvider>,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn LoadGenTransport>,
    log_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        provider: Arc<dyn CloudProvider>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn LoadGenTransport>,
    ) -> Self {
        Self {
            config,
            provider,
            clock,
            transport,
            log_dir: None,
        }
    }

    /// Mirror load-generator logs into `dir`.
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// Run `scenario` and tear down everything it created.
    ///
    /// Teardown runs exactly once on every exit path, including a panic
    /// in the scenario body; the panic resumes after teardown.
    pub async fn run(&self, scenario: Scenario) -> RunReport {
        let mut ctx = RunContext::new(
            self.config.clone(),
            self.provider.clone(),
            self.clock.clone(),
            self.transport.clone(),
            self.log_dir.clone(),
        );
        info!(%scenario, "run started");

        let body = AssertUnwindSafe(run_scenario(&mut ctx, scenario))
            .catch_unwind()
            .await;

        match &body {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!(%scenario, error = %e, phase = %ctx.phases.current(), "run failed"),
            Err(_) => error!(%scenario, phase = %ctx.phases.current(), "run panicked"),
        }

        ctx.phases.begin_teardown();
        let teardown = ctx.sequencer().run(&mut ctx.registry).await;
        for failure in &teardown.failures {
            warn!(
                category = %failure.handle.category,
                id = %failure.handle.id,
                error = %failure.error,
                "resource left behind"
            );
        }
        ctx.phases.finish();

        let outcome = match body {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        info!(
            %scenario,
            succeeded = outcome.is_ok(),
            deleted = teardown.deleted.len(),
            leftover = teardown.failures.len(),
            "run finished"
        );

        RunReport {
            scenario,
            outcome,
            teardown,
            phases: ctx.phases.history().to_vec(),
        }
    }
}

async fn run_scenario(ctx: &mut RunContext, scenario: Scenario) -> RunResult<RunSummary> {
    match scenario {
        Scenario::Horizontal => horizontal::run(ctx).await,
        Scenario::AutoScaling => autoscaling::run(ctx).await,
    }
}
