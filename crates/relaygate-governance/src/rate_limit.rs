use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter as GovernorLimiter};

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("distributed rate limiter backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// How a distributed backend failure is handled (spec.md §4.H step 3,
/// default `fail_closed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPolicy {
    FailOpen,
    FailClosed,
}

impl FailPolicy {
    pub fn from_fail_open(fail_open: bool) -> Self {
        if fail_open { Self::FailOpen } else { Self::FailClosed }
    }

    /// What `RateLimiter::check` should report when the backend errored.
    fn allows_on_error(self) -> bool {
        matches!(self, FailPolicy::FailOpen)
    }
}

/// Local, in-process token bucket keyed by tenant (spec.md §4.H: "Local
/// token bucket is authoritative unless a distributed limiter is
/// configured"). Tracks request-count (RPM) and, when configured,
/// tokens-per-minute (TPM) in two independent keyed buckets.
pub struct LocalRateLimiter {
    limiter: GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>,
    token_limiter: Option<GovernorLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>>,
}

impl LocalRateLimiter {
    pub fn new(rpm: u32, burst: u32) -> Self {
        let per_minute = NonZeroU32::new(rpm.max(1)).unwrap();
        let burst = NonZeroU32::new(burst.max(1)).unwrap();
        let quota = Quota::per_minute(per_minute).allow_burst(burst);
        Self {
            limiter: GovernorLimiter::keyed(quota),
            token_limiter: None,
        }
    }

    /// `tpm == 0` leaves token limiting disabled.
    pub fn with_tpm(mut self, tpm: u32) -> Self {
        if tpm > 0 {
            let quota = Quota::per_minute(NonZeroU32::new(tpm).unwrap());
            self.token_limiter = Some(GovernorLimiter::keyed(quota));
        }
        self
    }

    pub fn check(&self, principal: &str) -> bool {
        self.limiter.check_key(&principal.to_string()).is_ok()
    }

    /// `true` when no token limiter is configured or the request's
    /// estimated token count fits within the principal's remaining budget
    /// for this minute.
    pub fn check_tokens(&self, principal: &str, tokens: u32) -> bool {
        let Some(limiter) = &self.token_limiter else {
            return true;
        };
        let Some(cells) = NonZeroU32::new(tokens.max(1)) else {
            return true;
        };
        match limiter.check_key_n(&principal.to_string(), cells) {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        }
    }
}

/// A remote/shared limiter the engine consults instead of (or in addition
/// to) the local bucket once configured, e.g. backed by Redis across
/// replicas.
#[async_trait::async_trait]
pub trait DistributedRateLimiter: Send + Sync {
    async fn check(&self, principal: &str) -> Result<bool, RateLimitError>;

    /// Distributed backends aren't required to enforce TPM; the default
    /// defers to the local bucket's judgment.
    async fn check_tokens(&self, _principal: &str, _tokens: u32) -> Result<bool, RateLimitError> {
        Ok(true)
    }
}

pub enum RateLimiterBackend {
    Local(LocalRateLimiter),
    Distributed(Arc<dyn DistributedRateLimiter>, FailPolicy),
}

impl RateLimiterBackend {
    pub async fn check(&self, principal: &str) -> bool {
        match self {
            RateLimiterBackend::Local(limiter) => limiter.check(principal),
            RateLimiterBackend::Distributed(backend, policy) => match backend.check(principal).await {
                Ok(allowed) => allowed,
                Err(err) => {
                    tracing::warn!(error = %err, policy = ?policy, "distributed rate limiter backend error");
                    policy.allows_on_error()
                }
            },
        }
    }

    pub async fn check_tokens(&self, principal: &str, tokens: u32) -> bool {
        match self {
            RateLimiterBackend::Local(limiter) => limiter.check_tokens(principal, tokens),
            RateLimiterBackend::Distributed(backend, policy) => match backend.check_tokens(principal, tokens).await {
                Ok(allowed) => allowed,
                Err(err) => {
                    tracing::warn!(error = %err, policy = ?policy, "distributed token limiter backend error");
                    policy.allows_on_error()
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_bucket_rejects_once_exhausted() {
        let limiter = LocalRateLimiter::new(60, 1);
        assert!(limiter.check("tenant-a"));
        assert!(!limiter.check("tenant-a"));
    }

    #[test]
    fn local_bucket_tracks_tenants_independently() {
        let limiter = LocalRateLimiter::new(60, 1);
        assert!(limiter.check("tenant-a"));
        assert!(limiter.check("tenant-b"));
    }

    #[test]
    fn token_bucket_is_a_no_op_when_unconfigured() {
        let limiter = LocalRateLimiter::new(60, 60);
        assert!(limiter.check_tokens("tenant-a", 1_000_000));
    }

    #[test]
    fn token_bucket_rejects_once_the_minute_budget_is_spent() {
        let limiter = LocalRateLimiter::new(600, 600).with_tpm(1000);
        assert!(limiter.check_tokens("tenant-a", 900));
        assert!(!limiter.check_tokens("tenant-a", 200));
    }

    #[tokio::test]
    async fn distributed_backend_error_honors_fail_policy() {
        struct AlwaysErrors;
        #[async_trait::async_trait]
        impl DistributedRateLimiter for AlwaysErrors {
            async fn check(&self, _principal: &str) -> Result<bool, RateLimitError> {
                Err(RateLimitError::BackendUnavailable("down".into()))
            }
        }

        let fail_open = RateLimiterBackend::Distributed(Arc::new(AlwaysErrors), FailPolicy::FailOpen);
        assert!(fail_open.check("tenant-a").await);

        let fail_closed = RateLimiterBackend::Distributed(Arc::new(AlwaysErrors), FailPolicy::FailClosed);
        assert!(!fail_closed.check("tenant-a").await);
    }
}
