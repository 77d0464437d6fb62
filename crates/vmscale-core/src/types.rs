//! Domain types shared by every vmscale crate.
//!
//! Resource handles are what the registry records and what teardown
//! consumes. The `*Spec` types are the declarative inputs handed to a
//! `CloudProvider` when a resource is created.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identifier assigned by the provider (instance id, ARN, name).
pub type ProviderId = String;

// ── Resources ─────────────────────────────────────────────────────

/// Kind of cloud resource created during a run.
///
/// Declaration order doubles as the teardown tie-break: when two
/// categories are both free to be deleted, the later-declared one goes
/// first. See [`DependencyGraph::teardown_order`](crate::DependencyGraph::teardown_order).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ResourceCategory {
    NetworkRuleSet,
    ComputeInstance,
    TargetGroup,
    LoadBalancer,
    LaunchTemplate,
    ScalingGroup,
    ScalingPolicy,
    MetricAlarm,
}

impl ResourceCategory {
    /// Every category, in declaration order.
    pub const ALL: [ResourceCategory; 8] = [
        ResourceCategory::NetworkRuleSet,
        ResourceCategory::ComputeInstance,
        ResourceCategory::TargetGroup,
        ResourceCategory::LoadBalancer,
        ResourceCategory::LaunchTemplate,
        ResourceCategory::ScalingGroup,
        ResourceCategory::ScalingPolicy,
        ResourceCategory::MetricAlarm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceCategory::NetworkRuleSet => "network_rule_set",
            ResourceCategory::ComputeInstance => "compute_instance",
            ResourceCategory::TargetGroup => "target_group",
            ResourceCategory::LoadBalancer => "load_balancer",
            ResourceCategory::LaunchTemplate => "launch_template",
            ResourceCategory::ScalingGroup => "scaling_group",
            ResourceCategory::ScalingPolicy => "scaling_policy",
            ResourceCategory::MetricAlarm => "metric_alarm",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a single provider-side resource.
///
/// Handles are immutable; readiness waits return an enriched copy
/// (with the public endpoint filled in) rather than mutating the
/// registered one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub category: ResourceCategory,
    pub id: ProviderId,
    /// Public DNS name, once the provider has assigned one.
    pub endpoint: Option<String>,
}

impl ResourceHandle {
    pub fn new(category: ResourceCategory, id: impl Into<ProviderId>) -> Self {
        Self {
            category,
            id: id.into(),
            endpoint: None,
        }
    }

    /// Copy of this handle carrying the given endpoint.
    pub fn with_endpoint(&self, endpoint: impl Into<String>) -> Self {
        Self {
            category: self.category,
            id: self.id.clone(),
            endpoint: Some(endpoint.into()),
        }
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.id)
    }
}

/// Provider-reported lifecycle state of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Created, not yet usable (pending / provisioning).
    Pending,
    /// Running / active / available.
    Ready,
    /// Shutting down / deleting / draining.
    Deleting,
    /// Terminated / deleted / not found.
    Gone,
}

/// Result of describing a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStatus {
    pub state: LifecycleState,
    /// Public endpoint (instance DNS, balancer DNS), if any.
    pub endpoint: Option<String>,
    /// Member instance count (scaling groups only, zero otherwise).
    pub member_count: u32,
}

impl ResourceStatus {
    pub fn new(state: LifecycleState) -> Self {
        Self {
            state,
            endpoint: None,
            member_count: 0,
        }
    }
}

// ── Provisioning inputs ───────────────────────────────────────────

/// Key/value tag attached to created resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The provider's default network and its subnets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub network_id: String,
    pub subnet_ids: Vec<String>,
}

/// A single inbound TCP rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub port: u16,
    /// Source CIDR blocks, IPv4 and IPv6.
    pub cidrs: Vec<String>,
}

impl IngressRule {
    /// TCP on `port` from anywhere, IPv4 and IPv6.
    pub fn open_tcp(port: u16) -> Self {
        Self {
            port,
            cidrs: vec!["0.0.0.0/0".to_string(), "::/0".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSetSpec {
    pub name: String,
    pub description: String,
    pub network_id: Option<String>,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub image_id: String,
    pub instance_type: String,
    pub rule_set_id: ProviderId,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchTemplateSpec {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub rule_set_id: ProviderId,
    pub detailed_monitoring: bool,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroupSpec {
    pub name: String,
    pub network_id: String,
    pub port: u16,
    pub health_check_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub subnet_ids: Vec<String>,
    pub rule_set_id: ProviderId,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerSpec {
    pub balancer_id: ProviderId,
    pub target_group_id: ProviderId,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingGroupSpec {
    pub name: String,
    pub launch_template_id: ProviderId,
    pub target_group_id: ProviderId,
    pub subnet_ids: Vec<String>,
    pub min_size: u32,
    pub max_size: u32,
    /// Seconds before health checks count against a new member.
    pub health_check_grace_secs: u32,
    pub tags: Vec<Tag>,
}

/// Direction a scaling policy moves capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    Out,
    In,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPolicySpec {
    pub group_id: ProviderId,
    pub name: String,
    pub direction: ScalingDirection,
    /// Change in capacity; negative for scale-in.
    pub adjustment: i32,
    pub cooldown_secs: u32,
}

/// Comparison an alarm applies between the statistic and its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparator {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Comparator {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold,
            Comparator::GreaterThanOrEqual => value >= threshold,
            Comparator::LessThan => value < threshold,
            Comparator::LessThanOrEqual => value <= threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAlarmSpec {
    pub name: String,
    pub metric_name: String,
    pub namespace: String,
    /// Statistic evaluated over each period ("Average", "Maximum", ...).
    pub statistic: String,
    pub period_secs: u32,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparator: Comparator,
    /// Scaling group the metric is dimensioned on.
    pub group_id: ProviderId,
    /// Policy invoked when the alarm fires.
    pub action_id: ProviderId,
    pub unit: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_with_endpoint_keeps_identity() {
        let handle = ResourceHandle::new(ResourceCategory::ComputeInstance, "i-1");
        let enriched = handle.with_endpoint("ec2-1.example.com");

        assert_eq!(enriched.id, handle.id);
        assert_eq!(enriched.category, handle.category);
        assert_eq!(enriched.endpoint.as_deref(), Some("ec2-1.example.com"));
        assert!(handle.endpoint.is_none());
    }

    #[test]
    fn category_index_matches_all() {
        for (i, category) in ResourceCategory::ALL.iter().enumerate() {
            assert_eq!(category.index(), i);
        }
    }

    #[test]
    fn comparator_holds() {
        assert!(Comparator::GreaterThan.holds(80.1, 80.0));
        assert!(!Comparator::GreaterThan.holds(80.0, 80.0));
        assert!(Comparator::LessThanOrEqual.holds(20.0, 20.0));
        assert!(Comparator::LessThan.holds(10.0, 20.0));
    }

    #[test]
    fn open_tcp_rule_covers_both_families() {
        let rule = IngressRule::open_tcp(80);
        assert_eq!(rule.port, 80);
        assert_eq!(rule.cidrs, vec!["0.0.0.0/0", "::/0"]);
    }
}
