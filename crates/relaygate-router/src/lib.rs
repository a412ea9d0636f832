//! Deployment router and health prober (spec.md §4.D, §4.F).

mod deployment;
mod prober;
mod router;
mod stats;

pub use deployment::{Deployment, RequestContext};
pub use prober::{ProbeError, ProbeTarget, Prober};
pub use router::{Router, RouterConfig, RouterError};
pub use stats::{CooldownOwner, DeploymentStats, DeploymentStatsSnapshot};
