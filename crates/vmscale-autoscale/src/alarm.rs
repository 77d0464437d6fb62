//! Provider-side threshold alarms.
//!
//! The provider evaluates these alarms itself: a CPU alarm on the scaling
//! group fires a step policy that changes desired capacity. This module
//! only plans the policy/alarm pairs; the run provisions them after the
//! scaling group exists.

use vmscale_core::{
    Comparator, MetricAlarmSpec, ProviderId, RunConfig, ScalingDirection, ScalingPolicySpec,
};

use crate::controller::{Observation, ScalingController, ScalingDecision};

const CPU_METRIC: &str = "CPUUtilization";
const CPU_NAMESPACE: &str = "AWS/EC2";
const CPU_STATISTIC: &str = "Average";
const CPU_UNIT: &str = "Percent";

/// One policy plus the alarm that triggers it.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmRule {
    pub policy_name: String,
    pub alarm_name: String,
    pub direction: ScalingDirection,
    pub adjustment: i32,
    pub cooldown_secs: u32,
    pub period_secs: u32,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparator: Comparator,
}

impl AlarmRule {
    pub fn policy_spec(&self, group_id: &str) -> ScalingPolicySpec {
        ScalingPolicySpec {
            group_id: group_id.to_string(),
            name: self.policy_name.clone(),
            direction: self.direction,
            adjustment: self.adjustment,
            cooldown_secs: self.cooldown_secs,
        }
    }

    /// Alarm bound to an already created policy.
    pub fn alarm_spec(&self, group_id: &str, policy_id: &ProviderId) -> MetricAlarmSpec {
        MetricAlarmSpec {
            name: self.alarm_name.clone(),
            metric_name: CPU_METRIC.to_string(),
            namespace: CPU_NAMESPACE.to_string(),
            statistic: CPU_STATISTIC.to_string(),
            period_secs: self.period_secs,
            evaluation_periods: self.evaluation_periods,
            threshold: self.threshold,
            comparator: self.comparator,
            group_id: group_id.to_string(),
            action_id: policy_id.clone(),
            unit: CPU_UNIT.to_string(),
        }
    }
}

/// Scale-out/scale-in CPU alarms for a scaling group.
#[derive(Debug, Clone)]
pub struct ThresholdAlarm {
    rules: Vec<AlarmRule>,
}

impl ThresholdAlarm {
    pub fn from_config(config: &RunConfig) -> Self {
        let scale_out = AlarmRule {
            policy_name: "ScaleOutPolicy".to_string(),
            alarm_name: "HighCPUAlarm".to_string(),
            direction: ScalingDirection::Out,
            adjustment: config.scale_out_adjustment,
            cooldown_secs: config.cool_down_period_scale_out,
            period_secs: config.alarm_period,
            evaluation_periods: config.alarm_evaluation_periods_scale_out,
            threshold: config.cpu_upper_threshold,
            comparator: Comparator::GreaterThan,
        };
        let scale_in = AlarmRule {
            policy_name: "ScaleInPolicy".to_string(),
            alarm_name: "LowCPUAlarm".to_string(),
            direction: ScalingDirection::In,
            adjustment: config.scale_in_adjustment,
            cooldown_secs: config.cool_down_period_scale_in,
            period_secs: config.alarm_period,
            evaluation_periods: config.alarm_evaluation_periods_scale_in,
            threshold: config.cpu_lower_threshold,
            comparator: Comparator::LessThan,
        };
        Self {
            rules: vec![scale_out, scale_in],
        }
    }

    /// Rules in provisioning order, scale-out first.
    pub fn rules(&self) -> &[AlarmRule] {
        &self.rules
    }
}

impl ScalingController for ThresholdAlarm {
    fn name(&self) -> &'static str {
        "threshold_alarm"
    }

    /// Always `NoOp`: capacity changes happen inside the provider.
    fn evaluate(&mut self, _observation: &Observation) -> ScalingDecision {
        ScalingDecision::NoOp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config() -> RunConfig {
        let mut config = RunConfig::scaffold("ami-lg", "ami-ws", "m5.large");
        config.cpu_upper_threshold = 75.0;
        config.cpu_lower_threshold = 25.0;
        config.alarm_evaluation_periods_scale_in = 3;
        config.cool_down_period_scale_in = 120;
        config
    }

    #[test]
    fn plans_scale_out_then_scale_in() {
        let alarms = ThresholdAlarm::from_config(&config());
        let rules = alarms.rules();

        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].direction, ScalingDirection::Out);
        assert_eq!(rules[0].alarm_name, "HighCPUAlarm");
        assert_eq!(rules[0].comparator, Comparator::GreaterThan);
        assert_eq!(rules[0].threshold, 75.0);
        assert_eq!(rules[0].adjustment, 1);

        assert_eq!(rules[1].direction, ScalingDirection::In);
        assert_eq!(rules[1].alarm_name, "LowCPUAlarm");
        assert_eq!(rules[1].comparator, Comparator::LessThan);
        assert_eq!(rules[1].evaluation_periods, 3);
        assert_eq!(rules[1].adjustment, -1);
    }

    #[test]
    fn alarm_is_bound_to_policy_and_group() {
        let alarms = ThresholdAlarm::from_config(&config());
        let rule = &alarms.rules()[1];

        let policy = rule.policy_spec("asg-1");
        assert_eq!(policy.group_id, "asg-1");
        assert_eq!(policy.name, "ScaleInPolicy");
        assert_eq!(policy.cooldown_secs, 120);

        let alarm = rule.alarm_spec("asg-1", &"policy-2".to_string());
        assert_eq!(alarm.action_id, "policy-2");
        assert_eq!(alarm.group_id, "asg-1");
        assert_eq!(alarm.metric_name, "CPUUtilization");
        assert_eq!(alarm.statistic, "Average");
        assert!(alarm.comparator.holds(10.0, alarm.threshold));
    }

    #[test]
    fn evaluate_never_acts_locally() {
        let mut alarms = ThresholdAlarm::from_config(&config());
        let obs = Observation {
            now: Utc::now(),
            throughput: 0.0,
            test_complete: false,
        };
        assert_eq!(alarms.evaluate(&obs), ScalingDecision::NoOp);
    }
}
