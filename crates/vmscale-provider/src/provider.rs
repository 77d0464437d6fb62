//! The cloud provider capability.
//!
//! Everything the orchestrator needs from a provider session: create
//! calls for each resource category, a uniform `describe` used by every
//! readiness and deletion wait, and a uniform `delete`.

use async_trait::async_trait;

use vmscale_core::{
    IngressRule, InstanceSpec, LaunchTemplateSpec, ListenerSpec, LoadBalancerSpec,
    MetricAlarmSpec, NetworkInfo, ProviderId, ProviderResult, ResourceHandle, ResourceStatus,
    RuleSetSpec, ScalingGroupSpec, ScalingPolicySpec, TargetGroupSpec,
};

/// A single provider session, shared by provisioner and teardown.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// The default network and its subnets.
    async fn default_network(&self) -> ProviderResult<NetworkInfo>;

    /// Create an empty rule set. Creating one with a name that already
    /// exists returns the existing id.
    async fn create_rule_set(&self, spec: &RuleSetSpec) -> ProviderResult<ProviderId>;

    /// Add inbound rules to an existing rule set.
    async fn authorize_ingress(
        &self,
        rule_set_id: &str,
        rules: &[IngressRule],
    ) -> ProviderResult<()>;

    async fn launch_instance(&self, spec: &InstanceSpec) -> ProviderResult<ProviderId>;

    async fn create_launch_template(&self, spec: &LaunchTemplateSpec)
    -> ProviderResult<ProviderId>;

    async fn create_target_group(&self, spec: &TargetGroupSpec) -> ProviderResult<ProviderId>;

    async fn create_load_balancer(&self, spec: &LoadBalancerSpec) -> ProviderResult<ProviderId>;

    /// Bind a balancer to a target group. Listeners are deleted with
    /// their balancer and are not tracked separately.
    async fn create_listener(&self, spec: &ListenerSpec) -> ProviderResult<ProviderId>;

    async fn create_scaling_group(&self, spec: &ScalingGroupSpec) -> ProviderResult<ProviderId>;

    /// Returns an id usable as an alarm action target.
    async fn create_scaling_policy(&self, spec: &ScalingPolicySpec)
    -> ProviderResult<ProviderId>;

    async fn create_metric_alarm(&self, spec: &MetricAlarmSpec) -> ProviderResult<ProviderId>;

    /// Current state of a resource. Unknown ids report `Gone`.
    async fn describe(&self, handle: &ResourceHandle) -> ProviderResult<ResourceStatus>;

    /// Start deleting a resource. Scaling groups are force-deleted,
    /// terminating their members.
    async fn delete(&self, handle: &ResourceHandle) -> ProviderResult<()>;
}
