//! Run configuration (JSON) parser.
//!
//! Field names follow the project's JSON config files, e.g.
//! `auto-scaling-config.json`:
//!
//! ```json
//! {
//!   "load_generator_ami": "ami-0lg",
//!   "web_service_ami": "ami-0ws",
//!   "instance_type": "m5.large",
//!   "asg_min_size": 1,
//!   "asg_max_size": 5
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::Tag;
use crate::wait::WaitPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub load_generator_ami: String,
    pub web_service_ami: String,
    pub instance_type: String,
    /// Reuse an already running load generator instead of provisioning one.
    #[serde(default)]
    pub load_generator_endpoint: Option<String>,

    #[serde(default = "default_launch_template_name")]
    pub launch_template_name: String,
    #[serde(default = "default_target_group_name")]
    pub auto_scaling_target_group: String,
    #[serde(default = "default_load_balancer_name")]
    pub load_balancer_name: String,
    #[serde(default = "default_group_name")]
    pub auto_scaling_group_name: String,

    #[serde(default = "default_min_size")]
    pub asg_min_size: u32,
    #[serde(default = "default_max_size")]
    pub asg_max_size: u32,
    #[serde(default = "default_grace_period")]
    pub health_check_grace_period: u32,

    #[serde(default = "default_scale_out_adjustment")]
    pub scale_out_adjustment: i32,
    #[serde(default = "default_scale_in_adjustment")]
    pub scale_in_adjustment: i32,
    #[serde(default = "default_cooldown")]
    pub cool_down_period_scale_out: u32,
    #[serde(default = "default_cooldown")]
    pub cool_down_period_scale_in: u32,

    #[serde(default = "default_alarm_period")]
    pub alarm_period: u32,
    #[serde(default = "default_evaluation_periods")]
    pub alarm_evaluation_periods_scale_out: u32,
    #[serde(default = "default_evaluation_periods")]
    pub alarm_evaluation_periods_scale_in: u32,
    #[serde(default = "default_cpu_upper")]
    pub cpu_upper_threshold: f64,
    #[serde(default = "default_cpu_lower")]
    pub cpu_lower_threshold: f64,

    /// Seconds between time-window scale-outs in the horizontal test.
    #[serde(default = "default_scale_out_window")]
    pub scale_out_window_secs: u64,

    #[serde(default = "default_tags")]
    pub tags: Vec<Tag>,
    #[serde(default = "default_ingress_port")]
    pub ingress_port: u16,

    #[serde(default)]
    pub waits: WaitSettings,
}

/// Named poll policies for every wait in a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WaitSettings {
    pub instance_running: WaitPolicy,
    pub balancer_available: WaitPolicy,
    pub balancer_deleted: WaitPolicy,
    pub group_drained: WaitPolicy,
    pub instance_terminated: WaitPolicy,
    /// Retries of a create/delete call that failed transiently.
    pub transient_retry: WaitPolicy,
    /// Load-generator initialization and endpoint submission.
    pub test_init: WaitPolicy,
    /// Log polling while the main test runs.
    pub test_poll: WaitPolicy,
    /// Log polling during warmup.
    pub warmup_poll: WaitPolicy,
    /// Delay before deleting rule sets once instances are gone.
    #[serde(rename = "rule_set_grace_ms", with = "crate::wait::millis")]
    pub rule_set_grace: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            instance_running: WaitPolicy::from_secs(5, 120),
            balancer_available: WaitPolicy::from_secs(15, 40),
            balancer_deleted: WaitPolicy::from_secs(15, 40),
            group_drained: WaitPolicy::from_secs(10, 60),
            instance_terminated: WaitPolicy::from_secs(5, 120),
            transient_retry: WaitPolicy::from_secs(2, 10),
            test_init: WaitPolicy::from_secs(1, 300),
            test_poll: WaitPolicy::from_secs(1, 7200),
            warmup_poll: WaitPolicy::from_secs(10, 720),
            rule_set_grace: Duration::from_secs(10),
        }
    }
}

impl WaitSettings {
    /// Every wait collapsed to a zero interval; for simulated runs.
    pub fn immediate() -> Self {
        let fast = |p: WaitPolicy| WaitPolicy {
            poll_interval: Duration::ZERO,
            ..p
        };
        let d = Self::default();
        Self {
            instance_running: fast(d.instance_running),
            balancer_available: fast(d.balancer_available),
            balancer_deleted: fast(d.balancer_deleted),
            group_drained: fast(d.group_drained),
            instance_terminated: fast(d.instance_terminated),
            transient_retry: fast(d.transient_retry),
            test_init: fast(d.test_init),
            test_poll: fast(d.test_poll),
            warmup_poll: fast(d.warmup_poll),
            rule_set_grace: Duration::ZERO,
        }
    }

    fn policies(&self) -> [(&'static str, &WaitPolicy); 9] {
        [
            ("instance_running", &self.instance_running),
            ("balancer_available", &self.balancer_available),
            ("balancer_deleted", &self.balancer_deleted),
            ("group_drained", &self.group_drained),
            ("instance_terminated", &self.instance_terminated),
            ("transient_retry", &self.transient_retry),
            ("test_init", &self.test_init),
            ("test_poll", &self.test_poll),
            ("warmup_poll", &self.warmup_poll),
        ]
    }
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json(&content)?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject configurations the provider would only refuse later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_generator_ami.trim().is_empty() && self.load_generator_endpoint.is_none() {
            return Err(ConfigError::Invalid(
                "load_generator_ami is empty and no load_generator_endpoint given".to_string(),
            ));
        }
        if self.web_service_ami.trim().is_empty() {
            return Err(ConfigError::Invalid("web_service_ami is empty".to_string()));
        }
        if self.instance_type.trim().is_empty() {
            return Err(ConfigError::Invalid("instance_type is empty".to_string()));
        }
        if self.asg_min_size > self.asg_max_size {
            return Err(ConfigError::Invalid(format!(
                "asg_min_size ({}) exceeds asg_max_size ({})",
                self.asg_min_size, self.asg_max_size
            )));
        }
        if self.scale_out_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "scale_out_window_secs must be positive".to_string(),
            ));
        }
        for (name, policy) in self.waits.policies() {
            if policy.max_attempts == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "wait `{name}` allows zero attempts"
                )));
            }
            if policy.poll_interval.is_zero() && policy.max_attempts.is_none() {
                return Err(ConfigError::Invalid(format!(
                    "wait `{name}` has a zero poll interval and no attempt bound"
                )));
            }
        }
        Ok(())
    }

    /// Minimal config with the given images and defaults elsewhere.
    pub fn scaffold(lg_ami: &str, ws_ami: &str, instance_type: &str) -> Self {
        Self {
            load_generator_ami: lg_ami.to_string(),
            web_service_ami: ws_ami.to_string(),
            instance_type: instance_type.to_string(),
            load_generator_endpoint: None,
            launch_template_name: default_launch_template_name(),
            auto_scaling_target_group: default_target_group_name(),
            load_balancer_name: default_load_balancer_name(),
            auto_scaling_group_name: default_group_name(),
            asg_min_size: default_min_size(),
            asg_max_size: default_max_size(),
            health_check_grace_period: default_grace_period(),
            scale_out_adjustment: default_scale_out_adjustment(),
            scale_in_adjustment: default_scale_in_adjustment(),
            cool_down_period_scale_out: default_cooldown(),
            cool_down_period_scale_in: default_cooldown(),
            alarm_period: default_alarm_period(),
            alarm_evaluation_periods_scale_out: default_evaluation_periods(),
            alarm_evaluation_periods_scale_in: default_evaluation_periods(),
            cpu_upper_threshold: default_cpu_upper(),
            cpu_lower_threshold: default_cpu_lower(),
            scale_out_window_secs: default_scale_out_window(),
            tags: default_tags(),
            ingress_port: default_ingress_port(),
            waits: WaitSettings::default(),
        }
    }
}

fn default_launch_template_name() -> String {
    "vmscale-web-template".to_string()
}
fn default_target_group_name() -> String {
    "vmscale-web-tg".to_string()
}
fn default_load_balancer_name() -> String {
    "vmscale-web-lb".to_string()
}
fn default_group_name() -> String {
    "vmscale-web-asg".to_string()
}
fn default_min_size() -> u32 {
    1
}
fn default_max_size() -> u32 {
    5
}
fn default_grace_period() -> u32 {
    300
}
fn default_scale_out_adjustment() -> i32 {
    1
}
fn default_scale_in_adjustment() -> i32 {
    -1
}
fn default_cooldown() -> u32 {
    60
}
fn default_alarm_period() -> u32 {
    60
}
fn default_evaluation_periods() -> u32 {
    1
}
fn default_cpu_upper() -> f64 {
    80.0
}
fn default_cpu_lower() -> f64 {
    20.0
}
fn default_scale_out_window() -> u64 {
    100
}
fn default_tags() -> Vec<Tag> {
    vec![Tag::new("Project", "vm-scaling")]
}
fn default_ingress_port() -> u16 {
    80
}
