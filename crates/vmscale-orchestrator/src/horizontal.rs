//! Horizontal scaling scenario.
//!
//! One web instance starts the test; the reactive time-window controller
//! adds one more each time its window elapses, until the load generator
//! reports the test finished.

use std::time::Duration;

use tracing::{info, warn};

use vmscale_autoscale::{Observation, ReactiveTimeWindow, ScalingController, ScalingDecision};
use vmscale_core::ResourceHandle;
use vmscale_loadgen::{LoadGenError, Submission, TestKind, TestSession, TestSessionDriver};

use crate::context::{RunContext, endpoint_of};
use crate::error::RunResult;
use crate::phase::RunPhase;
use crate::report::RunSummary;

pub(crate) async fn run(ctx: &mut RunContext) -> RunResult<RunSummary> {
    ctx.phases.advance(RunPhase::Provisioning)?;
    let provisioner = ctx.provisioner();
    let network = provisioner.default_network().await?;

    let lg_host = ctx.load_generator_host(&network).await?;

    let ws_sg_spec = ctx.rule_set_spec("ws", &network.network_id);
    let ws_rules = ctx.ingress_rules();
    let ws_sg = provisioner
        .create_network_rule_set(&mut ctx.registry, &ws_sg_spec, &ws_rules)
        .await?;
    let ws_spec = ctx.instance_spec(&ctx.config.web_service_ami, &ws_sg.id);
    let first = provisioner
        .create_compute_instance(&mut ctx.registry, &ws_spec)
        .await?;
    let first_endpoint = endpoint_of(&first)?;

    ctx.phases.advance(RunPhase::Running)?;
    let driver = ctx.driver(&lg_host);
    let mut session = driver.start(TestKind::Horizontal, &first_endpoint).await?;

    let window = Duration::from_secs(ctx.config.scale_out_window_secs);
    let mut controller = ReactiveTimeWindow::new(window, session.started_at);
    let poll = ctx.config.waits.test_poll;
    let mut instances_added: u32 = 0;
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        let progress = driver.poll(&mut session).await?;
        info!(
            rps = progress.throughput,
            elapsed_secs = progress.elapsed_since_start.as_secs(),
            "test progress"
        );
        if progress.complete {
            break;
        }

        let observation = Observation {
            now: ctx.clock.now(),
            throughput: progress.throughput,
            test_complete: progress.complete,
        };
        match controller.evaluate(&observation) {
            ScalingDecision::ScaleOut(n) => {
                for _ in 0..n {
                    let ws = provisioner
                        .create_compute_instance(&mut ctx.registry, &ws_spec)
                        .await?;
                    instances_added += 1;
                    if submit(&driver, &mut session, &ws).await? == Submission::AlreadyComplete {
                        break;
                    }
                }
            }
            ScalingDecision::ScaleIn(n) => {
                warn!(count = n, "scale-in is not supported by this scenario, ignoring");
            }
            ScalingDecision::NoOp => {}
        }

        if session.complete {
            break;
        }
        if let Some(max) = poll.max_attempts
            && polls >= max
        {
            return Err(LoadGenError::WaitExhausted {
                what: format!("completion of {}", session.test_id),
                attempts: polls,
            }
            .into());
        }
        ctx.clock.sleep(poll.poll_interval).await;
    }

    ctx.phases.advance(RunPhase::Complete)?;
    info!(
        test_id = %session.test_id,
        instances_added,
        rps = session.last_throughput,
        "horizontal test finished"
    );
    Ok(RunSummary {
        test_id: session.test_id,
        instances_added,
        final_throughput: session.last_throughput,
    })
}

async fn submit(
    driver: &TestSessionDriver,
    session: &mut TestSession,
    ws: &ResourceHandle,
) -> RunResult<Submission> {
    let endpoint = endpoint_of(ws)?;
    let outcome = driver
        .register_additional_endpoint(session, &endpoint)
        .await?;
    if outcome == Submission::AlreadyComplete {
        info!(id = %ws.id, "test finished before the new instance joined");
    }
    Ok(outcome)
}
