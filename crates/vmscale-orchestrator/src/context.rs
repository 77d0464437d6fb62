//! Per-run context.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use vmscale_core::{
    Clock, IngressRule, InstanceSpec, NetworkInfo, ResourceHandle, ResourceRegistry, RuleSetSpec,
    RunConfig,
};
use vmscale_loadgen::{LoadGenTransport, TestSessionDriver};
use vmscale_provider::{CloudProvider, ProvisionError, ResourceProvisioner};
use vmscale_teardown::TeardownSequencer;

use crate::error::RunResult;
use crate::phase::PhaseTracker;

/// Everything one run owns. Built once per run and dropped after
/// teardown; nothing here outlives or is shared between runs.
pub struct RunContext {
    pub config: RunConfig,
    pub provider: Arc<dyn CloudProvider>,
    pub clock: Arc<dyn Clock>,
    pub transport: Arc<dyn LoadGenTransport>,
    pub registry: ResourceRegistry,
    pub phases: PhaseTracker,
    pub log_dir: Option<PathBuf>,
    /// Unix timestamp suffixed to rule set names.
    stamp: i64,
}

impl RunContext {
    pub fn new(
        config: RunConfig,
        provider: Arc<dyn CloudProvider>,
        clock: Arc<dyn Clock>,
        transport: Arc<dyn LoadGenTransport>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        let stamp = clock.now().timestamp();
        Self {
            config,
            provider,
            clock,
            transport,
            registry: ResourceRegistry::new(),
            phases: PhaseTracker::new(),
            log_dir,
            stamp,
        }
    }

    pub fn provisioner(&self) -> ResourceProvisioner {
        ResourceProvisioner::new(
            self.provider.clone(),
            self.clock.clone(),
            self.config.waits.clone(),
        )
    }

    pub fn sequencer(&self) -> TeardownSequencer {
        TeardownSequencer::new(
            self.provider.clone(),
            self.clock.clone(),
            self.config.waits.clone(),
        )
    }

    pub fn driver(&self, lg_host: &str) -> TestSessionDriver {
        let driver = TestSessionDriver::new(
            self.transport.clone(),
            self.clock.clone(),
            lg_host,
            &self.config.waits,
        );
        match &self.log_dir {
            Some(dir) => driver.with_log_dir(dir.clone()),
            None => driver,
        }
    }

    /// `<prefix>-sg-<stamp>` rule set in `network_id`.
    pub fn rule_set_spec(&self, prefix: &str, network_id: &str) -> RuleSetSpec {
        RuleSetSpec {
            name: format!("{prefix}-sg-{}", self.stamp),
            description: format!("vmscale {prefix} inbound HTTP"),
            network_id: Some(network_id.to_string()),
            tags: self.config.tags.clone(),
        }
    }

    pub fn ingress_rules(&self) -> Vec<IngressRule> {
        vec![IngressRule::open_tcp(self.config.ingress_port)]
    }

    pub fn instance_spec(&self, image_id: &str, rule_set_id: &str) -> InstanceSpec {
        InstanceSpec {
            image_id: image_id.to_string(),
            instance_type: self.config.instance_type.clone(),
            rule_set_id: rule_set_id.to_string(),
            tags: self.config.tags.clone(),
        }
    }

    /// The load generator's host: the configured endpoint, or a freshly
    /// provisioned instance behind its own rule set.
    pub async fn load_generator_host(&mut self, network: &NetworkInfo) -> RunResult<String> {
        if let Some(endpoint) = &self.config.load_generator_endpoint {
            info!(%endpoint, "using external load generator");
            return Ok(endpoint.clone());
        }

        let provisioner = self.provisioner();
        let spec = self.rule_set_spec("lg", &network.network_id);
        let rules = self.ingress_rules();
        let lg_sg = provisioner
            .create_network_rule_set(&mut self.registry, &spec, &rules)
            .await?;
        let spec = self.instance_spec(&self.config.load_generator_ami, &lg_sg.id);
        let lg = provisioner
            .create_compute_instance(&mut self.registry, &spec)
            .await?;
        Ok(endpoint_of(&lg)?)
    }
}

pub(crate) fn endpoint_of(handle: &ResourceHandle) -> Result<String, ProvisionError> {
    handle
        .endpoint
        .clone()
        .ok_or_else(|| ProvisionError::MissingEndpoint(handle.to_string()))
}
