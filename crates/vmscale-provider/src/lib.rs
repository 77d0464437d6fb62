//! vmscale-provider: ordered, registry-tracked resource creation.
//!
//! # Architecture
//!
//! ```text
//! ResourceProvisioner
//!   ├── Arc<dyn CloudProvider>   (one provider session per run)
//!   ├── Arc<dyn Clock>           (readiness polling)
//!   └── &mut ResourceRegistry    (passed per call, owned by the run)
//! ```
//!
//! Creation order follows the dependency graph: rule sets → instances →
//! distribution tier → scaling group → policies → alarms. Each handle is
//! registered as soon as the provider returns its id, before the
//! readiness wait, so a failed wait never leaks an untracked resource.
//!
//! `SimProvider` is an in-memory implementation used for tests and
//! simulated runs.

pub mod error;
pub mod provider;
pub mod provisioner;
pub mod sim;

pub use error::{ProvisionError, ProvisionResult};
pub use provider::CloudProvider;
pub use provisioner::{DistributionTier, DistributionTierSpec, ResourceProvisioner};
pub use sim::{SimOp, SimProvider};
