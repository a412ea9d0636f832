use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::router::Router;
use crate::stats::CooldownOwner;

/// Knows how to issue the lightest legal request for a given provider, e.g.
/// a `GET /models` or a single-token completion. Provider-specific, so the
/// router crate only depends on the trait — `relaygate-providers` supplies
/// real implementations.
#[async_trait::async_trait]
pub trait ProbeTarget: Send + Sync {
    async fn probe(&self, provider_name: &str, model_name: &str) -> Result<(), ProbeError>;
}

#[derive(Debug, thiserror::Error)]
#[error("probe failed: {0}")]
pub struct ProbeError(pub String);

/// Background health checker (spec.md §4.F). Runs as a single long-lived
/// task guarded by a `CompareAndSwap` on `running` so a duplicate `spawn`
/// call (e.g. from a config hot-reload path) can't start two probe loops
/// against the same router.
pub struct Prober<T: ProbeTarget> {
    router: Arc<Router>,
    target: Arc<T>,
    interval: Duration,
    timeout: Duration,
    cooldown: Duration,
    running: AtomicBool,
}

impl<T: ProbeTarget + 'static> Prober<T> {
    pub fn new(router: Arc<Router>, target: Arc<T>, interval: Duration, timeout: Duration, cooldown: Duration) -> Self {
        Self {
            router,
            target,
            interval,
            timeout,
            cooldown,
            running: AtomicBool::new(false),
        }
    }

    /// Starts the probe loop if it isn't already running. Returns `false`
    /// without spawning anything if another call already won the race.
    pub fn spawn(self: Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                self.probe_all().await;
            }
        });
        true
    }

    async fn probe_all(&self) {
        for deployment in self.router.list_deployments() {
            let result = tokio::time::timeout(
                self.timeout,
                self.target.probe(&deployment.provider_name, &deployment.model_name),
            )
            .await;

            match result {
                Ok(Ok(())) => {
                    self.router
                        .clear_cooldown_if_owned(&deployment.id, CooldownOwner::Prober);
                }
                Ok(Err(err)) => {
                    tracing::warn!(deployment = %deployment.id, error = %err, "deployment probe failed");
                    self.mark_failed(&deployment.id);
                }
                Err(_elapsed) => {
                    tracing::warn!(deployment = %deployment.id, "deployment probe timed out");
                    self.mark_failed(&deployment.id);
                }
            }
        }
    }

    /// The prober never invents cooldowns when disabled (`cooldown == 0`).
    fn mark_failed(&self, deployment_id: &str) {
        if self.cooldown.is_zero() {
            return;
        }
        self.router
            .extend_cooldown(deployment_id, self.cooldown, CooldownOwner::Prober);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deployment::Deployment;
    use crate::router::RouterConfig;
    use std::sync::atomic::AtomicUsize;

    struct FlakyProbe(AtomicUsize);

    #[async_trait::async_trait]
    impl ProbeTarget for FlakyProbe {
        async fn probe(&self, _provider: &str, _model: &str) -> Result<(), ProbeError> {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(ProbeError("simulated outage".into()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn failed_probe_sets_prober_owned_cooldown_then_clears_on_recovery() {
        let router = Arc::new(Router::new(
            vec![Deployment::new("d1", "openai", "gpt-4o")],
            RouterConfig::default(),
        ));
        let prober = Prober::new(
            Arc::clone(&router),
            Arc::new(FlakyProbe(AtomicUsize::new(0))),
            Duration::from_secs(3600),
            Duration::from_secs(1),
            Duration::from_secs(60),
        );

        prober.probe_all().await;
        assert!(router.get_stats("d1").unwrap().cooling_down);

        prober.probe_all().await;
        assert!(!router.get_stats("d1").unwrap().cooling_down);
    }
}
