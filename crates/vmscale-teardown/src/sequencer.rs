//! Dependency-ordered teardown.
//!
//! Walks categories in [`DependencyGraph::teardown_order`] and deletes
//! every registered handle. Errors never stop the walk: each failure is
//! logged and recorded, and the failed handle stays registered so a
//! later run can retry it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use vmscale_core::{
    Clock, DependencyGraph, LifecycleState, Probe, ProviderError, ProviderResult,
    ResourceCategory, ResourceHandle, ResourceRegistry, WaitError, WaitPolicy, WaitSettings,
    retry_transient, wait_until,
};
use vmscale_provider::CloudProvider;

use crate::report::{TeardownFailure, TeardownReport};

pub struct TeardownSequencer {
    provider: Arc<dyn CloudProvider>,
    clock: Arc<dyn Clock>,
    waits: WaitSettings,
    graph: DependencyGraph,
}

impl TeardownSequencer {
    pub fn new(provider: Arc<dyn CloudProvider>, clock: Arc<dyn Clock>, waits: WaitSettings) -> Self {
        Self {
            provider,
            clock,
            waits,
            graph: DependencyGraph::new(),
        }
    }

    /// Delete everything in `registry`, best-effort.
    ///
    /// Running it again on an already cleaned registry does nothing.
    pub async fn run(&self, registry: &mut ResourceRegistry) -> TeardownReport {
        let mut report = TeardownReport::default();
        if registry.is_empty() {
            debug!("nothing to tear down");
            return report;
        }

        info!(resources = registry.len(), "teardown started");
        let mut compute_torn_down = false;

        for category in self.graph.teardown_order() {
            let handles = registry.handles(category).to_vec();
            if handles.is_empty() {
                continue;
            }
            debug!(%category, count = handles.len(), "tearing down category");

            match category {
                ResourceCategory::ComputeInstance => {
                    self.terminate_instances(&handles, registry, &mut report).await;
                    compute_torn_down = true;
                }
                ResourceCategory::ScalingGroup => {
                    for handle in &handles {
                        let result = self
                            .delete_and_wait(handle, &self.waits.group_drained)
                            .await;
                        record(registry, &mut report, handle, result);
                    }
                    compute_torn_down = true;
                }
                ResourceCategory::LoadBalancer => {
                    for handle in &handles {
                        let result = self
                            .delete_and_wait(handle, &self.waits.balancer_deleted)
                            .await;
                        record(registry, &mut report, handle, result);
                    }
                }
                ResourceCategory::NetworkRuleSet => {
                    let grace = self.waits.rule_set_grace;
                    if compute_torn_down && !grace.is_zero() {
                        info!(
                            grace_secs = grace.as_secs(),
                            "waiting for network interfaces to detach"
                        );
                        self.clock.sleep(grace).await;
                    }
                    for handle in &handles {
                        let result = self.delete(handle).await;
                        record(registry, &mut report, handle, result);
                    }
                }
                ResourceCategory::TargetGroup
                | ResourceCategory::LaunchTemplate
                | ResourceCategory::ScalingPolicy
                | ResourceCategory::MetricAlarm => {
                    for handle in &handles {
                        let result = self.delete(handle).await;
                        record(registry, &mut report, handle, result);
                    }
                }
            }
        }

        if report.is_clean() {
            info!(deleted = report.deleted.len(), "teardown finished");
        } else {
            warn!(
                deleted = report.deleted.len(),
                failed = report.failures.len(),
                remaining = registry.len(),
                "teardown finished with failures"
            );
        }
        report
    }

    /// Terminate every instance first, then wait on each.
    async fn terminate_instances(
        &self,
        handles: &[ResourceHandle],
        registry: &mut ResourceRegistry,
        report: &mut TeardownReport,
    ) {
        let mut terminating = Vec::with_capacity(handles.len());
        for handle in handles {
            match self.delete(handle).await {
                Ok(()) => terminating.push(handle),
                Err(e) => record(registry, report, handle, Err(e)),
            }
        }

        for handle in terminating {
            let result = self
                .wait_gone(handle, &self.waits.instance_terminated)
                .await;
            record(registry, report, handle, result);
        }
    }

    async fn delete(&self, handle: &ResourceHandle) -> Result<(), WaitError<ProviderError>> {
        let what = format!("delete {handle}");
        retry_transient(self.clock.as_ref(), &self.waits.transient_retry, &what, || {
            self.provider.delete(handle)
        })
        .await
    }

    async fn delete_and_wait(
        &self,
        handle: &ResourceHandle,
        policy: &WaitPolicy,
    ) -> Result<(), WaitError<ProviderError>> {
        self.delete(handle).await?;
        self.wait_gone(handle, policy).await
    }

    /// Wait until the provider no longer knows `handle`.
    ///
    /// An empty scaling group still holds its template and target group
    /// until it is gone, so member count alone never settles a group.
    async fn wait_gone(
        &self,
        handle: &ResourceHandle,
        policy: &WaitPolicy,
    ) -> Result<(), WaitError<ProviderError>> {
        let what = format!("{handle} deleted");
        wait_until(self.clock.as_ref(), policy, &what, || self.probe_gone(handle)).await
    }

    async fn probe_gone(&self, handle: &ResourceHandle) -> ProviderResult<Probe<()>> {
        let status = self.provider.describe(handle).await?;
        if status.state == LifecycleState::Gone {
            return Ok(Probe::Done(()));
        }
        if handle.category == ResourceCategory::ScalingGroup {
            debug!(id = %handle.id, members = status.member_count, "scaling group draining");
        }
        Ok(Probe::NotYet)
    }
}

fn record(
    registry: &mut ResourceRegistry,
    report: &mut TeardownReport,
    handle: &ResourceHandle,
    result: Result<(), WaitError<ProviderError>>,
) {
    match result {
        Ok(()) => {
            registry.remove(handle.category, &handle.id);
            debug!(category = %handle.category, id = %handle.id, "deleted");
            report.deleted.push(handle.clone());
        }
        Err(error) => {
            warn!(
                category = %handle.category,
                id = %handle.id,
                error = %error,
                "failed to delete resource"
            );
            report.failures.push(TeardownFailure {
                handle: handle.clone(),
                error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;
    use vmscale_core::{
        IngressRule, InstanceSpec, LaunchTemplateSpec, LoadBalancerSpec, ManualClock, RuleSetSpec,
        ScalingGroupSpec, TargetGroupSpec,
    };
    use vmscale_provider::{DistributionTierSpec, ResourceProvisioner, SimOp, SimProvider};

    use ResourceCategory::*;

    fn handle(category: ResourceCategory, id: &str) -> ResourceHandle {
        ResourceHandle::new(category, id)
    }

    fn waits() -> WaitSettings {
        let mut waits = WaitSettings::immediate();
        waits.rule_set_grace = Duration::from_secs(10);
        waits
    }

    fn setup(sim: SimProvider) -> (Arc<SimProvider>, Arc<ManualClock>, TeardownSequencer) {
        let sim = Arc::new(sim);
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sequencer = TeardownSequencer::new(sim.clone(), clock.clone(), waits());
        (sim, clock, sequencer)
    }

    fn deleted_categories(sim: &SimProvider) -> Vec<ResourceCategory> {
        sim.deletions().iter().map(|h| h.category).collect()
    }

    #[tokio::test]
    async fn deletes_in_reverse_dependency_order_regardless_of_insertion() {
        let (sim, _, sequencer) = setup(SimProvider::new());

        let mut registry = ResourceRegistry::new();
        for h in [
            handle(NetworkRuleSet, "sg-1"),
            handle(MetricAlarm, "alarm-1"),
            handle(ComputeInstance, "i-1"),
            handle(TargetGroup, "tg-1"),
            handle(ScalingGroup, "asg-1"),
            handle(LaunchTemplate, "lt-1"),
            handle(ScalingPolicy, "policy-1"),
            handle(LoadBalancer, "lb-1"),
            handle(MetricAlarm, "alarm-2"),
            handle(NetworkRuleSet, "sg-2"),
        ] {
            registry.register(h);
        }

        let report = sequencer.run(&mut registry).await;

        assert!(report.is_clean());
        assert!(registry.is_empty());
        assert_eq!(
            deleted_categories(&sim),
            vec![
                MetricAlarm,
                MetricAlarm,
                ScalingPolicy,
                ScalingGroup,
                LaunchTemplate,
                LoadBalancer,
                TargetGroup,
                ComputeInstance,
                NetworkRuleSet,
                NetworkRuleSet,
            ]
        );
        // Within a category, registration order.
        assert_eq!(report.deleted[0].id, "alarm-1");
        assert_eq!(report.deleted[8].id, "sg-1");
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let (sim, _, sequencer) = setup(SimProvider::new());
        let mut registry = ResourceRegistry::new();
        registry.register(handle(ComputeInstance, "i-1"));
        registry.register(handle(NetworkRuleSet, "sg-1"));

        let first = sequencer.run(&mut registry).await;
        assert_eq!(first.deleted.len(), 2);
        let ops = sim.journal().len();

        let second = sequencer.run(&mut registry).await;
        assert_eq!(second, TeardownReport::default());
        assert_eq!(sim.journal().len(), ops);
    }

    #[tokio::test]
    async fn one_failing_instance_does_not_stop_the_rest() {
        let (sim, _, sequencer) = setup(SimProvider::new().fail_delete("i-2"));
        let mut registry = ResourceRegistry::new();
        registry.register(handle(ComputeInstance, "i-1"));
        registry.register(handle(ComputeInstance, "i-2"));
        registry.register(handle(ComputeInstance, "i-3"));
        registry.register(handle(NetworkRuleSet, "sg-1"));

        let report = sequencer.run(&mut registry).await;

        let attempted: Vec<_> = sim.deletions().into_iter().map(|h| h.id).collect();
        assert_eq!(attempted, vec!["i-1", "i-2", "i-3", "sg-1"]);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].handle.id, "i-2");
        assert!(matches!(
            report.failures[0].error,
            WaitError::Aborted(ProviderError::Rejected(_))
        ));

        // Only the failed handle is left for a retry.
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(ComputeInstance, "i-2"));
    }

    #[tokio::test]
    async fn grace_period_only_after_compute_teardown() {
        let (_, clock, sequencer) = setup(SimProvider::new());
        let mut registry = ResourceRegistry::new();
        registry.register(handle(NetworkRuleSet, "sg-1"));
        sequencer.run(&mut registry).await;
        assert_eq!(clock.total_slept(), Duration::ZERO);

        registry.register(handle(ComputeInstance, "i-1"));
        registry.register(handle(NetworkRuleSet, "sg-2"));
        sequencer.run(&mut registry).await;
        assert_eq!(clock.total_slept(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn instances_all_terminated_before_waiting() {
        let (sim, _, sequencer) = setup(SimProvider::new().with_pending_polls(2));
        let provisioner =
            ResourceProvisioner::new(sim.clone(), Arc::new(ManualClock::new(Utc::now())), waits());
        let mut registry = ResourceRegistry::new();

        let sg = provisioner
            .create_network_rule_set(
                &mut registry,
                &RuleSetSpec {
                    name: "ws-sg".into(),
                    description: "web".into(),
                    network_id: None,
                    tags: vec![],
                },
                &[IngressRule::open_tcp(80)],
            )
            .await
            .unwrap();
        for _ in 0..2 {
            provisioner
                .create_compute_instance(
                    &mut registry,
                    &InstanceSpec {
                        image_id: "ami-ws".into(),
                        instance_type: "m5.large".into(),
                        rule_set_id: sg.id.clone(),
                        tags: vec![],
                    },
                )
                .await
                .unwrap();
        }

        let report = sequencer.run(&mut registry).await;
        assert!(report.is_clean(), "{:?}", report.failures);
        assert!(sim.live().is_empty());

        // Both terminations are issued back to back.
        let deletes: Vec<_> = sim
            .journal()
            .into_iter()
            .filter(|op| matches!(op, SimOp::Delete(_)))
            .collect();
        assert!(matches!(&deletes[0], SimOp::Delete(h) if h.category == ComputeInstance));
        assert!(matches!(&deletes[1], SimOp::Delete(h) if h.category == ComputeInstance));
    }

    /// Rule set, launch template, distribution tier and a scaling group.
    async fn provision_stack(sim: Arc<SimProvider>, min_size: u32) -> ResourceRegistry {
        let provisioner =
            ResourceProvisioner::new(sim, Arc::new(ManualClock::new(Utc::now())), waits());
        let mut registry = ResourceRegistry::new();

        let sg = provisioner
            .create_network_rule_set(
                &mut registry,
                &RuleSetSpec {
                    name: "ws-sg".into(),
                    description: "web".into(),
                    network_id: None,
                    tags: vec![],
                },
                &[IngressRule::open_tcp(80)],
            )
            .await
            .unwrap();
        let lt = provisioner
            .create_launch_template(
                &mut registry,
                &LaunchTemplateSpec {
                    name: "lt".into(),
                    image_id: "ami-ws".into(),
                    instance_type: "m5.large".into(),
                    rule_set_id: sg.id.clone(),
                    detailed_monitoring: true,
                    tags: vec![],
                },
            )
            .await
            .unwrap();
        let tier = provisioner
            .create_distribution_tier(
                &mut registry,
                &DistributionTierSpec {
                    target_group: TargetGroupSpec {
                        name: "tg".into(),
                        network_id: "vpc-sim".into(),
                        port: 80,
                        health_check_path: "/".into(),
                    },
                    load_balancer: LoadBalancerSpec {
                        name: "lb".into(),
                        subnet_ids: vec!["subnet-a".into()],
                        rule_set_id: sg.id.clone(),
                        tags: vec![],
                    },
                    listener_port: 80,
                },
            )
            .await
            .unwrap();
        provisioner
            .create_scaling_group(
                &mut registry,
                &ScalingGroupSpec {
                    name: "asg".into(),
                    launch_template_id: lt.id.clone(),
                    target_group_id: tier.target_group.id.clone(),
                    subnet_ids: vec!["subnet-a".into()],
                    min_size,
                    max_size: 2,
                    health_check_grace_secs: 60,
                    tags: vec![],
                },
            )
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn full_stack_leaves_nothing_behind() {
        let (sim, _, sequencer) = setup(SimProvider::new().with_pending_polls(1));
        let mut registry = provision_stack(sim.clone(), 1).await;

        let report = sequencer.run(&mut registry).await;

        assert!(report.is_clean(), "{:?}", report.failures);
        assert!(registry.is_empty());
        assert!(sim.live().is_empty());
    }

    #[tokio::test]
    async fn empty_scaling_group_is_waited_until_gone() {
        let (sim, _, sequencer) = setup(SimProvider::new().with_pending_polls(1));
        let mut registry = provision_stack(sim.clone(), 0).await;

        let report = sequencer.run(&mut registry).await;

        assert!(report.is_clean(), "{:?}", report.failures);
        assert!(registry.is_empty());
        assert!(sim.live().is_empty());
        assert_eq!(
            deleted_categories(&sim),
            vec![ScalingGroup, LaunchTemplate, LoadBalancer, TargetGroup, NetworkRuleSet]
        );
    }

    #[tokio::test]
    async fn wrong_order_would_violate_dependencies() {
        // Sanity check of the simulated provider the tests above rely on.
        let sim = SimProvider::new();
        let sg = sim
            .create_rule_set(&RuleSetSpec {
                name: "sg".into(),
                description: String::new(),
                network_id: None,
                tags: vec![],
            })
            .await
            .unwrap();
        sim.launch_instance(&InstanceSpec {
            image_id: "ami".into(),
            instance_type: "m5.large".into(),
            rule_set_id: sg.clone(),
            tags: vec![],
        })
        .await
        .unwrap();

        let err = sim.delete(&handle(NetworkRuleSet, &sg)).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(msg) if msg.contains("dependency violation")));
    }
}
