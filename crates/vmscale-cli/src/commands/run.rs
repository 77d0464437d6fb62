use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tracing::info;

use vmscale_core::{Clock, ManualClock, RunConfig, SystemClock};
use vmscale_loadgen::{HyperTransport, LoadGenTransport, SimLoadGenerator};
use vmscale_orchestrator::{Orchestrator, RunReport, Scenario};
use vmscale_provider::{CloudProvider, SimProvider};

use crate::{ProviderKind, RunArgs};

/// `describe` calls a simulated resource spends in each transition.
const SIM_PENDING_POLLS: u32 = 2;

pub async fn run(scenario: Scenario, args: &RunArgs) -> anyhow::Result<()> {
    let config = load_config(args)?;

    let provider: Arc<dyn CloudProvider> = match args.provider {
        ProviderKind::Sim => Arc::new(SimProvider::new().with_pending_polls(SIM_PENDING_POLLS)),
    };

    // A real load generator needs real time; the simulated one runs on a
    // virtual clock so a full test finishes instantly.
    let (clock, transport): (Arc<dyn Clock>, Arc<dyn LoadGenTransport>) =
        if config.load_generator_endpoint.is_some() {
            (Arc::new(SystemClock), Arc::new(HyperTransport::default()))
        } else {
            let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
            let lg = SimLoadGenerator::new(clock.clone(), Duration::from_secs(args.sim_duration));
            (clock, Arc::new(lg))
        };

    let mut orchestrator = Orchestrator::new(config, provider, clock, transport);
    if let Some(dir) = &args.log_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        orchestrator = orchestrator.with_log_dir(dir.clone());
    }

    let report = orchestrator.run(scenario).await;
    print_report(&report);

    match report.outcome {
        Ok(_) => Ok(()),
        Err(e) => Err(anyhow::Error::new(e).context(format!("{scenario} run failed"))),
    }
}

/// File config (or placeholders) with command-line values applied on top.
pub(crate) fn load_config(args: &RunArgs) -> anyhow::Result<RunConfig> {
    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => {
            info!("no config file given, using placeholder images");
            RunConfig::scaffold("ami-sim-lg", "ami-sim-ws", "t3.micro")
        }
    };
    if let Some(endpoint) = &args.lg_endpoint {
        config.load_generator_endpoint = Some(endpoint.clone());
    }
    config.validate()?;
    Ok(config)
}

fn print_report(report: &RunReport) {
    match &report.outcome {
        Ok(summary) => {
            println!("✓ {} test {} finished", report.scenario, summary.test_id);
            println!("  Final throughput: {:.1} rps", summary.final_throughput);
            if report.scenario == Scenario::Horizontal {
                println!("  Instances added:  {}", summary.instances_added);
            }
        }
        Err(e) => println!("✗ {} run failed: {e}", report.scenario),
    }
    println!("  Resources deleted: {}", report.teardown.deleted.len());
    for failure in &report.teardown.failures {
        println!("  Left behind: {failure}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(config: Option<std::path::PathBuf>) -> RunArgs {
        RunArgs {
            config,
            lg_endpoint: None,
            log_dir: None,
            provider: ProviderKind::Sim,
            sim_duration: 60,
        }
    }

    #[test]
    fn lg_endpoint_flag_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut on_disk = RunConfig::scaffold("ami-lg", "ami-ws", "m5.large");
        on_disk.load_generator_endpoint = Some("from-file:80".to_string());
        file.write_all(on_disk.to_json_string().unwrap().as_bytes())
            .unwrap();

        let mut args = args(Some(file.path().to_path_buf()));
        let loaded = load_config(&args).unwrap();
        assert_eq!(loaded.load_generator_endpoint.as_deref(), Some("from-file:80"));
        assert_eq!(loaded.instance_type, "m5.large");

        args.lg_endpoint = Some("from-flag:8080".to_string());
        let loaded = load_config(&args).unwrap();
        assert_eq!(loaded.load_generator_endpoint.as_deref(), Some("from-flag:8080"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut on_disk = RunConfig::scaffold("ami-lg", "ami-ws", "m5.large");
        on_disk.asg_min_size = 5;
        on_disk.asg_max_size = 2;
        file.write_all(on_disk.to_json_string().unwrap().as_bytes())
            .unwrap();

        assert!(load_config(&args(Some(file.path().to_path_buf()))).is_err());
    }

    #[tokio::test]
    async fn simulated_run_succeeds_and_writes_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = args(None);
        args.log_dir = Some(dir.path().join("logs"));

        run(Scenario::Horizontal, &args).await.unwrap();

        assert!(dir.path().join("logs").join("test.1.log").exists());
    }
}
