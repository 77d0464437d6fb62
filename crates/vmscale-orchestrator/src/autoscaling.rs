//! Auto-scaling scenario.
//!
//! Builds a launch template, a balancer-fronted scaling group and two CPU
//! alarms, warms the balancer up, then runs the auto-scaling test. Capacity
//! changes happen inside the provider, driven by the alarms.

use tracing::info;

use vmscale_autoscale::{Observation, ScalingController, ThresholdAlarm};
use vmscale_core::{LaunchTemplateSpec, LoadBalancerSpec, ScalingGroupSpec, TargetGroupSpec};
use vmscale_loadgen::TestKind;
use vmscale_provider::DistributionTierSpec;

use crate::context::{RunContext, endpoint_of};
use crate::error::RunResult;
use crate::phase::RunPhase;
use crate::report::RunSummary;

const HEALTH_CHECK_PATH: &str = "/";

pub(crate) async fn run(ctx: &mut RunContext) -> RunResult<RunSummary> {
    ctx.phases.advance(RunPhase::Provisioning)?;
    let provisioner = ctx.provisioner();
    let network = provisioner.default_network().await?;

    let lg_host = ctx.load_generator_host(&network).await?;

    let rules = ctx.ingress_rules();
    let ws_sg_spec = ctx.rule_set_spec("ws", &network.network_id);
    let ws_sg = provisioner
        .create_network_rule_set(&mut ctx.registry, &ws_sg_spec, &rules)
        .await?;

    let config = &ctx.config;
    let template_spec = LaunchTemplateSpec {
        name: config.launch_template_name.clone(),
        image_id: config.web_service_ami.clone(),
        instance_type: config.instance_type.clone(),
        rule_set_id: ws_sg.id.clone(),
        detailed_monitoring: true,
        tags: config.tags.clone(),
    };
    let tier_spec = DistributionTierSpec {
        target_group: TargetGroupSpec {
            name: config.auto_scaling_target_group.clone(),
            network_id: network.network_id.clone(),
            port: config.ingress_port,
            health_check_path: HEALTH_CHECK_PATH.to_string(),
        },
        load_balancer: LoadBalancerSpec {
            name: config.load_balancer_name.clone(),
            subnet_ids: network.subnet_ids.clone(),
            rule_set_id: ws_sg.id.clone(),
            tags: config.tags.clone(),
        },
        listener_port: config.ingress_port,
    };

    let template = provisioner
        .create_launch_template(&mut ctx.registry, &template_spec)
        .await?;
    let tier = provisioner
        .create_distribution_tier(&mut ctx.registry, &tier_spec)
        .await?;

    let group_spec = ScalingGroupSpec {
        name: ctx.config.auto_scaling_group_name.clone(),
        launch_template_id: template.id.clone(),
        target_group_id: tier.target_group.id.clone(),
        subnet_ids: network.subnet_ids.clone(),
        min_size: ctx.config.asg_min_size,
        max_size: ctx.config.asg_max_size,
        health_check_grace_secs: ctx.config.health_check_grace_period,
        tags: ctx.config.tags.clone(),
    };
    let group = provisioner
        .create_scaling_group(&mut ctx.registry, &group_spec)
        .await?;

    let mut alarms = ThresholdAlarm::from_config(&ctx.config);
    for rule in alarms.rules() {
        let policy = provisioner
            .create_scaling_policy(&mut ctx.registry, &rule.policy_spec(&group.id))
            .await?;
        provisioner
            .create_metric_alarm(&mut ctx.registry, &rule.alarm_spec(&group.id, &policy.id))
            .await?;
    }

    let lb_endpoint = endpoint_of(&tier.load_balancer)?;
    let driver = ctx.driver(&lg_host);

    ctx.phases.advance(RunPhase::Warmup)?;
    let mut warmup = driver.start(TestKind::Warmup, &lb_endpoint).await?;
    let warmed = driver
        .wait_complete(&mut warmup, &ctx.config.waits.warmup_poll)
        .await?;
    info!(test_id = %warmup.test_id, rps = warmed.throughput, "warmup finished");

    ctx.phases.advance(RunPhase::Running)?;
    let mut session = driver.start(TestKind::AutoScaling, &lb_endpoint).await?;
    let finished = driver
        .wait_complete(&mut session, &ctx.config.waits.test_poll)
        .await?;

    // The provider already acted on the alarms; this only records the
    // final observation.
    let decision = alarms.evaluate(&Observation {
        now: ctx.clock.now(),
        throughput: finished.throughput,
        test_complete: true,
    });
    info!(
        test_id = %session.test_id,
        controller = alarms.name(),
        ?decision,
        rps = finished.throughput,
        "auto-scaling test finished"
    );

    ctx.phases.advance(RunPhase::Complete)?;
    Ok(RunSummary {
        test_id: session.test_id,
        instances_added: 0,
        final_throughput: session.last_throughput,
    })
}
