//! ResourceProvisioner: creates resources one at a time, in dependency
//! order, registering each handle before anything else can fail.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! create (retry transient) → registry.register(handle) → wait ready → enriched handle
//! ```
//!
//! Errors are never swallowed. The caller owns the registry and is
//! responsible for running teardown when an operation fails.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use vmscale_core::{
    Clock, IngressRule, InstanceSpec, LaunchTemplateSpec, LifecycleState, ListenerSpec,
    LoadBalancerSpec, MetricAlarmSpec, NetworkInfo, Probe, ProviderError, ProviderId,
    ProviderResult, ResourceCategory, ResourceHandle, ResourceRegistry, ResourceStatus,
    RuleSetSpec, ScalingGroupSpec, ScalingPolicySpec, TargetGroupSpec, WaitPolicy, WaitSettings,
    retry_transient, wait_until,
};

use crate::error::{ProvisionError, ProvisionResult};
use crate::provider::CloudProvider;

/// Inputs for a balancer, its target group and the listener binding them.
#[derive(Debug, Clone)]
pub struct DistributionTierSpec {
    pub target_group: TargetGroupSpec,
    pub load_balancer: LoadBalancerSpec,
    pub listener_port: u16,
}

/// Handles making up a distribution tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTier {
    pub target_group: ResourceHandle,
    /// Carries the balancer's public endpoint.
    pub load_balancer: ResourceHandle,
    pub listener_id: ProviderId,
}

/// Creates resources against a provider session.
pub struct ResourceProvisioner {
    provider: Arc<dyn CloudProvider>,
    clock: Arc<dyn Clock>,
    waits: WaitSettings,
}

impl ResourceProvisioner {
    pub fn new(provider: Arc<dyn CloudProvider>, clock: Arc<dyn Clock>, waits: WaitSettings) -> Self {
        Self {
            provider,
            clock,
            waits,
        }
    }

    /// Look up the default network; nothing is created.
    pub async fn default_network(&self) -> ProvisionResult<NetworkInfo> {
        let provider = &self.provider;
        retry_transient(
            self.clock.as_ref(),
            &self.waits.transient_retry,
            "describe default network",
            || provider.default_network(),
        )
        .await
        .map_err(|e| ProvisionError::from_wait(ResourceCategory::NetworkRuleSet, e))
    }

    /// Create an inbound rule set and open `rules` on it.
    ///
    /// A rule set that is already registered (same provider id) is not
    /// registered twice.
    pub async fn create_network_rule_set(
        &self,
        registry: &mut ResourceRegistry,
        spec: &RuleSetSpec,
        rules: &[IngressRule],
    ) -> ProvisionResult<ResourceHandle> {
        let category = ResourceCategory::NetworkRuleSet;
        let provider = &self.provider;
        let id = self
            .create(category, "create rule set", || provider.create_rule_set(spec))
            .await?;

        let handle = ResourceHandle::new(category, id);
        if registry.contains(category, &handle.id) {
            debug!(id = %handle.id, name = %spec.name, "rule set already registered");
        } else {
            registry.register(handle.clone());
        }

        retry_transient(
            self.clock.as_ref(),
            &self.waits.transient_retry,
            "authorize ingress",
            || provider.authorize_ingress(&handle.id, rules),
        )
        .await
        .map_err(|e| ProvisionError::from_wait(category, e))?;

        info!(id = %handle.id, name = %spec.name, rules = rules.len(), "rule set created");
        Ok(handle)
    }

    /// Launch one instance and wait until it is running.
    ///
    /// The returned handle carries the instance's public endpoint.
    pub async fn create_compute_instance(
        &self,
        registry: &mut ResourceRegistry,
        spec: &InstanceSpec,
    ) -> ProvisionResult<ResourceHandle> {
        let category = ResourceCategory::ComputeInstance;
        let provider = &self.provider;
        let id = self
            .create(category, "launch instance", || provider.launch_instance(spec))
            .await?;

        let handle = ResourceHandle::new(category, id);
        registry.register(handle.clone());
        info!(id = %handle.id, image = %spec.image_id, "instance launched, waiting for running");

        let status = self
            .wait_ready(&handle, &self.waits.instance_running, "instance running")
            .await?;
        let endpoint = status
            .endpoint
            .ok_or_else(|| ProvisionError::MissingEndpoint(handle.to_string()))?;

        info!(id = %handle.id, %endpoint, "instance running");
        Ok(handle.with_endpoint(endpoint))
    }

    /// Create a target group, a balancer and the listener binding them.
    ///
    /// Blocks until the balancer reports available.
    pub async fn create_distribution_tier(
        &self,
        registry: &mut ResourceRegistry,
        spec: &DistributionTierSpec,
    ) -> ProvisionResult<DistributionTier> {
        let provider = &self.provider;

        let tg_id = self
            .create(ResourceCategory::TargetGroup, "create target group", || {
                provider.create_target_group(&spec.target_group)
            })
            .await?;
        let target_group = ResourceHandle::new(ResourceCategory::TargetGroup, tg_id);
        registry.register(target_group.clone());
        info!(id = %target_group.id, name = %spec.target_group.name, "target group created");

        let lb_id = self
            .create(ResourceCategory::LoadBalancer, "create load balancer", || {
                provider.create_load_balancer(&spec.load_balancer)
            })
            .await?;
        let balancer = ResourceHandle::new(ResourceCategory::LoadBalancer, lb_id);
        registry.register(balancer.clone());
        info!(id = %balancer.id, "load balancer created, waiting for available");

        let status = self
            .wait_ready(&balancer, &self.waits.balancer_available, "load balancer available")
            .await?;
        let endpoint = status
            .endpoint
            .ok_or_else(|| ProvisionError::MissingEndpoint(balancer.to_string()))?;

        let listener = ListenerSpec {
            balancer_id: balancer.id.clone(),
            target_group_id: target_group.id.clone(),
            port: spec.listener_port,
        };
        let listener_id = self
            .create(ResourceCategory::LoadBalancer, "create listener", || {
                provider.create_listener(&listener)
            })
            .await?;

        info!(balancer = %balancer.id, %endpoint, listener = %listener_id, "distribution tier ready");
        Ok(DistributionTier {
            target_group,
            load_balancer: balancer.with_endpoint(endpoint),
            listener_id,
        })
    }

    pub async fn create_launch_template(
        &self,
        registry: &mut ResourceRegistry,
        spec: &LaunchTemplateSpec,
    ) -> ProvisionResult<ResourceHandle> {
        let provider = &self.provider;
        let handle = self
            .create_registered(registry, ResourceCategory::LaunchTemplate, "create launch template", || {
                provider.create_launch_template(spec)
            })
            .await?;
        info!(id = %handle.id, name = %spec.name, "launch template created");
        Ok(handle)
    }

    pub async fn create_scaling_group(
        &self,
        registry: &mut ResourceRegistry,
        spec: &ScalingGroupSpec,
    ) -> ProvisionResult<ResourceHandle> {
        let provider = &self.provider;
        let handle = self
            .create_registered(registry, ResourceCategory::ScalingGroup, "create scaling group", || {
                provider.create_scaling_group(spec)
            })
            .await?;
        info!(
            id = %handle.id,
            min = spec.min_size,
            max = spec.max_size,
            grace_secs = spec.health_check_grace_secs,
            "scaling group created"
        );
        Ok(handle)
    }

    /// The returned handle's id is usable as an alarm action.
    pub async fn create_scaling_policy(
        &self,
        registry: &mut ResourceRegistry,
        spec: &ScalingPolicySpec,
    ) -> ProvisionResult<ResourceHandle> {
        let provider = &self.provider;
        let handle = self
            .create_registered(registry, ResourceCategory::ScalingPolicy, "create scaling policy", || {
                provider.create_scaling_policy(spec)
            })
            .await?;
        info!(
            id = %handle.id,
            direction = ?spec.direction,
            adjustment = spec.adjustment,
            cooldown_secs = spec.cooldown_secs,
            "scaling policy created"
        );
        Ok(handle)
    }

    pub async fn create_metric_alarm(
        &self,
        registry: &mut ResourceRegistry,
        spec: &MetricAlarmSpec,
    ) -> ProvisionResult<ResourceHandle> {
        let provider = &self.provider;
        let handle = self
            .create_registered(registry, ResourceCategory::MetricAlarm, "create metric alarm", || {
                provider.create_metric_alarm(spec)
            })
            .await?;
        info!(
            id = %handle.id,
            metric = %spec.metric_name,
            threshold = spec.threshold,
            comparator = ?spec.comparator,
            action = %spec.action_id,
            "metric alarm created"
        );
        Ok(handle)
    }

    async fn create_registered<F, Fut>(
        &self,
        registry: &mut ResourceRegistry,
        category: ResourceCategory,
        what: &str,
        op: F,
    ) -> ProvisionResult<ResourceHandle>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<ProviderId>>,
    {
        let id = self.create(category, what, op).await?;
        let handle = ResourceHandle::new(category, id);
        registry.register(handle.clone());
        Ok(handle)
    }

    async fn create<F, Fut>(
        &self,
        category: ResourceCategory,
        what: &str,
        op: F,
    ) -> ProvisionResult<ProviderId>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<ProviderId>>,
    {
        retry_transient(self.clock.as_ref(), &self.waits.transient_retry, what, op)
            .await
            .map_err(|e| ProvisionError::from_wait(category, e))
    }

    async fn wait_ready(
        &self,
        handle: &ResourceHandle,
        policy: &WaitPolicy,
        what: &str,
    ) -> ProvisionResult<ResourceStatus> {
        let provider = &self.provider;
        wait_until(self.clock.as_ref(), policy, what, || async move {
            let status = provider.describe(handle).await?;
            match status.state {
                LifecycleState::Ready => Ok(Probe::Done(status)),
                LifecycleState::Pending => Ok(Probe::NotYet),
                LifecycleState::Deleting | LifecycleState::Gone => Err(ProviderError::Rejected(
                    format!("{handle} went away before becoming ready"),
                )),
            }
        })
        .await
        .map_err(|e| ProvisionError::from_wait(handle.category, e))
    }
}
