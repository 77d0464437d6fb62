//! Run-level errors.

use thiserror::Error;

use vmscale_core::ConfigError;
use vmscale_loadgen::LoadGenError;
use vmscale_provider::ProvisionError;

use crate::phase::RunPhase;

pub type RunResult<T> = Result<T, RunError>;

/// The first fatal error of a run. Teardown failures are never reported
/// here.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("provisioning failed: {0}")]
    Provision(#[from] ProvisionError),

    #[error("load test failed: {0}")]
    LoadGen(#[from] LoadGenError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid phase transition {from} -> {to}")]
    PhaseTransition { from: RunPhase, to: RunPhase },
}
