//! SimProvider: in-memory `CloudProvider`.
//!
//! Backs `--provider sim` runs and every orchestration test. Resources
//! move through `Pending → Ready` and `Deleting → Gone` after a
//! configurable number of `describe` calls. Deleting a resource that a
//! live resource still references fails the way a real provider reports
//! a dependency violation, so a wrong teardown order shows up as errors.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use vmscale_core::{
    IngressRule, InstanceSpec, LaunchTemplateSpec, LifecycleState, ListenerSpec,
    LoadBalancerSpec, MetricAlarmSpec, NetworkInfo, ProviderError, ProviderId, ProviderResult,
    ResourceCategory, ResourceHandle, ResourceStatus, RuleSetSpec, ScalingGroupSpec,
    ScalingPolicySpec, TargetGroupSpec,
};

use crate::provider::CloudProvider;

/// One call recorded by the simulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    Create(ResourceHandle),
    Delete(ResourceHandle),
}

#[derive(Debug)]
struct SimResource {
    category: ResourceCategory,
    name: Option<String>,
    state: LifecycleState,
    /// `describe` calls left before the next state transition.
    polls_left: u32,
    endpoint: Option<String>,
    member_count: u32,
    /// Ids this resource depends on.
    refs: Vec<ProviderId>,
}

#[derive(Debug, Default)]
struct SimState {
    counters: HashMap<ResourceCategory, u32>,
    resources: HashMap<ProviderId, SimResource>,
    journal: Vec<SimOp>,
    transient_left: u32,
}

#[derive(Debug, Default)]
struct SimFaults {
    reject_create: HashSet<ResourceCategory>,
    fail_readiness: HashSet<ResourceCategory>,
    fail_delete: HashSet<ProviderId>,
}

/// In-memory provider with fault injection.
#[derive(Debug)]
pub struct SimProvider {
    state: Mutex<SimState>,
    faults: SimFaults,
    pending_polls: u32,
}

impl Default for SimProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SimProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            faults: SimFaults::default(),
            pending_polls: 0,
        }
    }

    /// `describe` calls that report `Pending`/`Deleting` before each
    /// transition completes.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Fail the next `count` create calls with `Unavailable`.
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.lock().transient_left = count;
        self
    }

    /// Reject every create call for `category`.
    pub fn reject_create(mut self, category: ResourceCategory) -> Self {
        self.faults.reject_create.insert(category);
        self
    }

    /// Fail the readiness step for `category`: `describe` is rejected,
    /// and for rule sets the ingress authorization is rejected.
    pub fn fail_readiness(mut self, category: ResourceCategory) -> Self {
        self.faults.fail_readiness.insert(category);
        self
    }

    /// Reject deletion of the resource with this id.
    pub fn fail_delete(mut self, id: impl Into<ProviderId>) -> Self {
        self.faults.fail_delete.insert(id.into());
        self
    }

    /// Every create/delete call so far, in order.
    pub fn journal(&self) -> Vec<SimOp> {
        self.lock().journal.clone()
    }

    /// Handles passed to `delete`, in call order.
    pub fn deletions(&self) -> Vec<ResourceHandle> {
        self.lock()
            .journal
            .iter()
            .filter_map(|op| match op {
                SimOp::Delete(h) => Some(h.clone()),
                SimOp::Create(_) => None,
            })
            .collect()
    }

    /// Resources that are not yet gone.
    pub fn live(&self) -> Vec<ResourceHandle> {
        let state = self.lock();
        let mut live: Vec<_> = state
            .resources
            .iter()
            .filter(|(_, r)| r.state != LifecycleState::Gone)
            .map(|(id, r)| ResourceHandle::new(r.category, id.clone()))
            .collect();
        live.sort_by(|a, b| (a.category, &a.id).cmp(&(b.category, &b.id)));
        live
    }

    /// Overwrite a scaling group's member count, as its autoscaler would.
    pub fn set_member_count(&self, group_id: &str, members: u32) {
        if let Some(r) = self.lock().resources.get_mut(group_id) {
            r.member_count = members;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn insert(
        &self,
        category: ResourceCategory,
        name: Option<&str>,
        refs: Vec<ProviderId>,
        endpoint: Option<String>,
        member_count: u32,
    ) -> ProviderResult<ProviderId> {
        if self.faults.reject_create.contains(&category) {
            return Err(ProviderError::Rejected(format!(
                "quota exceeded for {category}"
            )));
        }

        let mut state = self.lock();
        if state.transient_left > 0 {
            state.transient_left -= 1;
            return Err(ProviderError::Unavailable("request throttled".to_string()));
        }

        let counter = state.counters.entry(category).or_insert(0);
        *counter += 1;
        let id = format!("{}-{}", id_prefix(category), counter);
        let endpoint = endpoint.map(|e| e.replace("{id}", &id));

        // Resources without a readiness wait are usable immediately.
        let waits = matches!(
            category,
            ResourceCategory::ComputeInstance | ResourceCategory::LoadBalancer
        );
        let (initial, polls_left) = if waits && self.pending_polls > 0 {
            (LifecycleState::Pending, self.pending_polls)
        } else {
            (LifecycleState::Ready, 0)
        };

        state.resources.insert(
            id.clone(),
            SimResource {
                category,
                name: name.map(str::to_string),
                state: initial,
                polls_left,
                endpoint,
                member_count,
                refs,
            },
        );
        state
            .journal
            .push(SimOp::Create(ResourceHandle::new(category, id.clone())));
        debug!(%category, %id, "sim resource created");
        Ok(id)
    }
}

fn id_prefix(category: ResourceCategory) -> &'static str {
    match category {
        ResourceCategory::NetworkRuleSet => "sg",
        ResourceCategory::ComputeInstance => "i",
        ResourceCategory::TargetGroup => "tg",
        ResourceCategory::LoadBalancer => "lb",
        ResourceCategory::LaunchTemplate => "lt",
        ResourceCategory::ScalingGroup => "asg",
        ResourceCategory::ScalingPolicy => "policy",
        ResourceCategory::MetricAlarm => "alarm",
    }
}

#[async_trait]
impl CloudProvider for SimProvider {
    async fn default_network(&self) -> ProviderResult<NetworkInfo> {
        Ok(NetworkInfo {
            network_id: "vpc-sim".to_string(),
            subnet_ids: vec!["subnet-sim-a".to_string(), "subnet-sim-b".to_string()],
        })
    }

    async fn create_rule_set(&self, spec: &RuleSetSpec) -> ProviderResult<ProviderId> {
        let existing = self
            .lock()
            .resources
            .iter()
            .find(|(_, r)| {
                r.category == ResourceCategory::NetworkRuleSet
                    && r.state != LifecycleState::Gone
                    && r.name.as_deref() == Some(spec.name.as_str())
            })
            .map(|(id, _)| id.clone());
        if let Some(id) = existing {
            return Ok(id);
        }
        self.insert(ResourceCategory::NetworkRuleSet, Some(&spec.name), vec![], None, 0)
    }

    async fn authorize_ingress(
        &self,
        rule_set_id: &str,
        _rules: &[IngressRule],
    ) -> ProviderResult<()> {
        if self
            .faults
            .fail_readiness
            .contains(&ResourceCategory::NetworkRuleSet)
        {
            return Err(ProviderError::Rejected(format!(
                "rule limit exceeded on {rule_set_id}"
            )));
        }
        if !self.lock().resources.contains_key(rule_set_id) {
            return Err(ProviderError::Rejected(format!(
                "rule set {rule_set_id} not found"
            )));
        }
        Ok(())
    }

    async fn launch_instance(&self, spec: &InstanceSpec) -> ProviderResult<ProviderId> {
        self.insert(
            ResourceCategory::ComputeInstance,
            None,
            vec![spec.rule_set_id.clone()],
            Some("{id}.compute.sim.vmscale.internal".to_string()),
            0,
        )
    }

    async fn create_launch_template(
        &self,
        spec: &LaunchTemplateSpec,
    ) -> ProviderResult<ProviderId> {
        self.insert(
            ResourceCategory::LaunchTemplate,
            Some(&spec.name),
            vec![spec.rule_set_id.clone()],
            None,
            0,
        )
    }

    async fn create_target_group(&self, spec: &TargetGroupSpec) -> ProviderResult<ProviderId> {
        self.insert(ResourceCategory::TargetGroup, Some(&spec.name), vec![], None, 0)
    }

    async fn create_load_balancer(&self, spec: &LoadBalancerSpec) -> ProviderResult<ProviderId> {
        self.insert(
            ResourceCategory::LoadBalancer,
            Some(&spec.name),
            vec![spec.rule_set_id.clone()],
            Some(format!("{}-{{id}}.elb.sim.vmscale.internal", spec.name)),
            0,
        )
    }

    async fn create_listener(&self, spec: &ListenerSpec) -> ProviderResult<ProviderId> {
        let mut state = self.lock();
        let Some(balancer) = state.resources.get_mut(&spec.balancer_id) else {
            return Err(ProviderError::Rejected(format!(
                "load balancer {} not found",
                spec.balancer_id
            )));
        };
        // The listener lives and dies with its balancer.
        balancer.refs.push(spec.target_group_id.clone());
        Ok(format!("{}/listener/{}", spec.balancer_id, spec.port))
    }

    async fn create_scaling_group(&self, spec: &ScalingGroupSpec) -> ProviderResult<ProviderId> {
        if spec.min_size > spec.max_size {
            return Err(ProviderError::Rejected(format!(
                "min size {} exceeds max size {}",
                spec.min_size, spec.max_size
            )));
        }
        self.insert(
            ResourceCategory::ScalingGroup,
            Some(&spec.name),
            vec![spec.launch_template_id.clone(), spec.target_group_id.clone()],
            None,
            spec.min_size,
        )
    }

    async fn create_scaling_policy(
        &self,
        spec: &ScalingPolicySpec,
    ) -> ProviderResult<ProviderId> {
        self.insert(
            ResourceCategory::ScalingPolicy,
            Some(&spec.name),
            vec![spec.group_id.clone()],
            None,
            0,
        )
    }

    async fn create_metric_alarm(&self, spec: &MetricAlarmSpec) -> ProviderResult<ProviderId> {
        self.insert(
            ResourceCategory::MetricAlarm,
            Some(&spec.name),
            vec![spec.action_id.clone(), spec.group_id.clone()],
            None,
            0,
        )
    }

    async fn describe(&self, handle: &ResourceHandle) -> ProviderResult<ResourceStatus> {
        let mut state = self.lock();
        let Some(resource) = state.resources.get_mut(&handle.id) else {
            return Ok(ResourceStatus::new(LifecycleState::Gone));
        };

        // Injected readiness failures only apply until deletion starts.
        if matches!(resource.state, LifecycleState::Pending | LifecycleState::Ready)
            && self.faults.fail_readiness.contains(&resource.category)
        {
            return Err(ProviderError::Rejected(format!("{handle} failed to start")));
        }

        if matches!(resource.state, LifecycleState::Pending | LifecycleState::Deleting) {
            if resource.polls_left > 0 {
                resource.polls_left -= 1;
            } else if resource.state == LifecycleState::Pending {
                resource.state = LifecycleState::Ready;
            } else {
                resource.state = LifecycleState::Gone;
                resource.member_count = 0;
            }
        }

        Ok(ResourceStatus {
            state: resource.state,
            endpoint: match resource.state {
                LifecycleState::Ready => resource.endpoint.clone(),
                _ => None,
            },
            member_count: resource.member_count,
        })
    }

    async fn delete(&self, handle: &ResourceHandle) -> ProviderResult<()> {
        let mut state = self.lock();
        state.journal.push(SimOp::Delete(handle.clone()));

        if self.faults.fail_delete.contains(&handle.id) {
            return Err(ProviderError::Rejected(format!(
                "not authorized to delete {handle}"
            )));
        }

        let dependents: Vec<ProviderId> = state
            .resources
            .iter()
            .filter(|(_, r)| r.state != LifecycleState::Gone && r.refs.contains(&handle.id))
            .map(|(id, _)| id.clone())
            .collect();
        if !dependents.is_empty() {
            return Err(ProviderError::Rejected(format!(
                "dependency violation: {handle} is in use by {}",
                dependents.join(", ")
            )));
        }

        let pending_polls = self.pending_polls;
        match state.resources.get_mut(&handle.id) {
            Some(resource) if resource.state != LifecycleState::Gone => {
                // Instances, balancers and groups drain asynchronously.
                let drains = matches!(
                    resource.category,
                    ResourceCategory::ComputeInstance
                        | ResourceCategory::LoadBalancer
                        | ResourceCategory::ScalingGroup
                );
                if drains && pending_polls > 0 {
                    resource.state = LifecycleState::Deleting;
                    resource.polls_left = pending_polls;
                } else {
                    resource.state = LifecycleState::Gone;
                    resource.member_count = 0;
                }
                debug!(%handle, "sim resource deleting");
                Ok(())
            }
            // Deleting something already gone is a no-op, as on real providers.
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pending_resources_become_ready_after_polls() {
        let sim = SimProvider::new().with_pending_polls(2);
        let id = sim
            .launch_instance(&InstanceSpec {
                image_id: "ami".into(),
                instance_type: "t3.micro".into(),
                rule_set_id: "sg-1".into(),
                tags: vec![],
            })
            .await
            .unwrap();
        let handle = ResourceHandle::new(ResourceCategory::ComputeInstance, id);

        assert_eq!(sim.describe(&handle).await.unwrap().state, LifecycleState::Pending);
        assert_eq!(sim.describe(&handle).await.unwrap().state, LifecycleState::Pending);
        let status = sim.describe(&handle).await.unwrap();
        assert_eq!(status.state, LifecycleState::Ready);
        assert_eq!(status.endpoint.as_deref(), Some("i-1.compute.sim.vmscale.internal"));
    }

    #[tokio::test]
    async fn rule_set_in_use_cannot_be_deleted() {
        let sim = SimProvider::new();
        let sg = sim
            .create_rule_set(&RuleSetSpec {
                name: "ws-sg".into(),
                description: String::new(),
                network_id: None,
                tags: vec![],
            })
            .await
            .unwrap();
        let instance = sim
            .launch_instance(&InstanceSpec {
                image_id: "ami".into(),
                instance_type: "t3.micro".into(),
                rule_set_id: sg.clone(),
                tags: vec![],
            })
            .await
            .unwrap();

        let sg_handle = ResourceHandle::new(ResourceCategory::NetworkRuleSet, sg);
        let err = sim.delete(&sg_handle).await.unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(msg) if msg.contains("dependency violation")));

        sim.delete(&ResourceHandle::new(ResourceCategory::ComputeInstance, instance))
            .await
            .unwrap();
        sim.delete(&sg_handle).await.unwrap();
        assert!(sim.live().is_empty());
    }

    #[tokio::test]
    async fn scaling_group_drains_members_on_delete() {
        let sim = SimProvider::new().with_pending_polls(1);
        let id = sim
            .create_scaling_group(&ScalingGroupSpec {
                name: "asg".into(),
                launch_template_id: "lt-1".into(),
                target_group_id: "tg-1".into(),
                subnet_ids: vec![],
                min_size: 2,
                max_size: 4,
                health_check_grace_secs: 0,
                tags: vec![],
            })
            .await
            .unwrap();
        let handle = ResourceHandle::new(ResourceCategory::ScalingGroup, id);
        assert_eq!(sim.describe(&handle).await.unwrap().member_count, 2);

        sim.delete(&handle).await.unwrap();
        let draining = sim.describe(&handle).await.unwrap();
        assert_eq!(draining.state, LifecycleState::Deleting);
        assert_eq!(draining.member_count, 2);

        let gone = sim.describe(&handle).await.unwrap();
        assert_eq!(gone.state, LifecycleState::Gone);
        assert_eq!(gone.member_count, 0);
    }

    #[tokio::test]
    async fn unknown_ids_are_gone() {
        let sim = SimProvider::new();
        let handle = ResourceHandle::new(ResourceCategory::MetricAlarm, "HighCPUAlarm");
        assert_eq!(sim.describe(&handle).await.unwrap().state, LifecycleState::Gone);
        sim.delete(&handle).await.unwrap();
    }
}
