use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;

use crate::deployment::{Deployment, RequestContext};
use crate::stats::{CooldownOwner, DeploymentStats, DeploymentStatsSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("no deployment available for model")]
    NoAvailableDeployment,
}

pub struct RouterConfig {
    pub failure_threshold: u32,
    pub cooldown_base: Duration,
    pub cooldown_max: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_base: Duration::from_secs(5),
            cooldown_max: Duration::from_secs(300),
        }
    }
}

/// Deployment registry + picker (spec.md §4.D). The deployment list is
/// hot-swappable via `ArcSwap` the same way the provider credential pool
/// swaps its snapshot; the per-deployment stats map sits behind a plain
/// `RwLock` since every access is a short, bounded critical section rather
/// than something held across an await point.
pub struct Router {
    deployments: ArcSwap<Vec<Deployment>>,
    stats: RwLock<HashMap<String, DeploymentStats>>,
    config: RouterConfig,
}

impl Router {
    pub fn new(deployments: Vec<Deployment>, config: RouterConfig) -> Self {
        let stats = deployments
            .iter()
            .map(|d| (d.id.clone(), DeploymentStats::default()))
            .collect();
        Self {
            deployments: ArcSwap::new(std::sync::Arc::new(deployments)),
            stats: RwLock::new(stats),
            config,
        }
    }

    /// Replace the deployment list wholesale; new entries get fresh stats,
    /// entries dropped from the list are pruned from the stats map so it
    /// doesn't grow unbounded across config reloads.
    pub fn replace_deployments(&self, deployments: Vec<Deployment>) {
        let mut stats = self.stats.write().expect("router stats poisoned");
        stats.retain(|id, _| deployments.iter().any(|d| &d.id == id));
        for deployment in &deployments {
            stats.entry(deployment.id.clone()).or_default();
        }
        drop(stats);
        self.deployments.store(std::sync::Arc::new(deployments));
    }

    pub fn list_deployments(&self) -> Vec<Deployment> {
        self.deployments.load().as_ref().clone()
    }

    pub fn get_stats(&self, id: &str) -> Option<DeploymentStatsSnapshot> {
        let stats = self.stats.read().expect("router stats poisoned");
        stats.get(id).map(|s| DeploymentStatsSnapshot {
            consecutive_failures: s.consecutive_failures,
            ewma_latency_ms: s.ewma_latency_ms,
            cooling_down: s.is_cooling_down(Instant::now()),
        })
    }

    pub fn pick(&self, model: &str) -> Result<Deployment, RouterError> {
        self.pick_with_context(&RequestContext::for_model(model))
    }

    /// Selection: filter to eligible, non-cooling-down deployments, then
    /// order by priority, then EWMA latency, breaking remaining ties with a
    /// tenant-scoped deterministic hash so repeat requests from the same
    /// tenant land on a stable deployment without every tenant piling onto
    /// the same one.
    pub fn pick_with_context(&self, ctx: &RequestContext) -> Result<Deployment, RouterError> {
        let deployments = self.deployments.load();
        let now = Instant::now();
        let stats = self.stats.read().expect("router stats poisoned");

        let mut candidates: Vec<&Deployment> = deployments
            .iter()
            .filter(|d| d.is_eligible_for(ctx))
            .filter(|d| !stats.get(&d.id).is_some_and(|s| s.is_cooling_down(now)))
            .collect();

        if candidates.is_empty() {
            return Err(RouterError::NoAvailableDeployment);
        }

        candidates.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| {
                    let la = stats.get(&a.id).map(|s| s.ewma_latency_ms).unwrap_or(0.0);
                    let lb = stats.get(&b.id).map(|s| s.ewma_latency_ms).unwrap_or(0.0);
                    la.partial_cmp(&lb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| tie_break_hash(ctx, a).cmp(&tie_break_hash(ctx, b)))
        });

        Ok(candidates[0].clone())
    }

    pub fn report_success(&self, deployment_id: &str, latency: Duration) {
        let mut stats = self.stats.write().expect("router stats poisoned");
        stats
            .entry(deployment_id.to_string())
            .or_default()
            .record_success(latency.as_secs_f64() * 1000.0);
    }

    pub fn report_failure(&self, deployment_id: &str) {
        let now = Instant::now();
        let mut stats = self.stats.write().expect("router stats poisoned");
        stats
            .entry(deployment_id.to_string())
            .or_default()
            .record_failure(
                self.config.failure_threshold,
                self.config.cooldown_base,
                self.config.cooldown_max,
                now,
            );
    }

    pub fn set_cooldown(&self, deployment_id: &str, duration: Option<Duration>, owner: CooldownOwner) {
        let mut stats = self.stats.write().expect("router stats poisoned");
        let until = duration.map(|d| Instant::now() + d);
        stats
            .entry(deployment_id.to_string())
            .or_default()
            .set_cooldown(until, owner);
    }

    /// Like `set_cooldown`, but never shortens an already-later cooldown —
    /// used by the prober, which must not undercut a cooldown the router
    /// itself is still holding for an unrelated reason.
    pub(crate) fn extend_cooldown(&self, deployment_id: &str, duration: Duration, owner: CooldownOwner) {
        let now = Instant::now();
        let mut stats = self.stats.write().expect("router stats poisoned");
        let entry = stats.entry(deployment_id.to_string()).or_default();
        let candidate = now + duration;
        let until = match entry.cooldown_until {
            Some(existing) if existing > candidate => existing,
            _ => candidate,
        };
        entry.set_cooldown(Some(until), owner);
    }

    pub(crate) fn clear_cooldown_if_owned(&self, deployment_id: &str, owner: CooldownOwner) {
        let mut stats = self.stats.write().expect("router stats poisoned");
        if let Some(s) = stats.get_mut(deployment_id) {
            s.clear_if_owned_by(owner);
        }
    }
}

fn tie_break_hash(ctx: &RequestContext, deployment: &Deployment) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    ctx.tenant_scope.as_deref().unwrap_or("").hash(&mut hasher);
    deployment.id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::new(
            vec![
                Deployment::new("d1", "openai", "gpt-4o").with_priority(10),
                Deployment::new("d2", "azure", "gpt-4o").with_priority(20),
            ],
            RouterConfig::default(),
        )
    }

    #[test]
    fn picks_highest_priority_first() {
        let router = router();
        let picked = router.pick("gpt-4o").unwrap();
        assert_eq!(picked.id, "d1");
    }

    #[test]
    fn no_match_for_unknown_model() {
        let router = router();
        assert!(matches!(
            router.pick("claude-3"),
            Err(RouterError::NoAvailableDeployment)
        ));
    }

    #[test]
    fn cooldown_excludes_deployment_until_expiry() {
        let router = router();
        for _ in 0..3 {
            router.report_failure("d1");
        }
        let picked = router.pick("gpt-4o").unwrap();
        assert_eq!(picked.id, "d2");
    }

    #[test]
    fn success_clears_failure_streak() {
        let router = router();
        router.report_failure("d1");
        router.report_failure("d1");
        router.report_success("d1", Duration::from_millis(20));
        router.report_failure("d1");
        let picked = router.pick("gpt-4o").unwrap();
        assert_eq!(picked.id, "d1");
    }

    #[test]
    fn manual_cooldown_is_owner_scoped() {
        let router = router();
        router.set_cooldown("d1", Some(Duration::from_secs(60)), CooldownOwner::Prober);
        router.clear_cooldown_if_owned("d1", CooldownOwner::Router);
        assert!(matches!(router.pick("gpt-4o"), Ok(ref d) if d.id == "d2"));
        router.clear_cooldown_if_owned("d1", CooldownOwner::Prober);
        assert!(matches!(router.pick("gpt-4o"), Ok(ref d) if d.id == "d1"));
    }
}
