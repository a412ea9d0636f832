use std::time::{Duration, Instant};

/// Who most recently put a deployment into cooldown. Kept distinct so the
/// prober's own health judgement never gets clobbered by, or clobbers,
/// the router's failure-triggered cooldown (spec.md §9 open question).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownOwner {
    Router,
    Prober,
}

#[derive(Debug, Clone)]
pub struct DeploymentStats {
    pub consecutive_failures: u32,
    pub ewma_latency_ms: f64,
    pub cooldown_until: Option<Instant>,
    pub cooldown_owner: Option<CooldownOwner>,
}

impl Default for DeploymentStats {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            ewma_latency_ms: 0.0,
            cooldown_until: None,
            cooldown_owner: None,
        }
    }
}

const EWMA_ALPHA: f64 = 0.2;

impl DeploymentStats {
    pub fn is_cooling_down(&self, now: Instant) -> bool {
        matches!(self.cooldown_until, Some(until) if until > now)
    }

    pub fn record_success(&mut self, latency_ms: f64) {
        self.consecutive_failures = 0;
        if self.ewma_latency_ms == 0.0 {
            self.ewma_latency_ms = latency_ms;
        } else {
            self.ewma_latency_ms = EWMA_ALPHA * latency_ms + (1.0 - EWMA_ALPHA) * self.ewma_latency_ms;
        }
    }

    /// Exponential backoff, capped at `max`, triggered once consecutive
    /// failures cross `threshold`. Mirrors the disallow-entry TTL shape the
    /// credential pool uses, but keyed on a failure streak instead of a
    /// single hard error.
    pub fn record_failure(&mut self, threshold: u32, base: Duration, max: Duration, now: Instant) {
        self.consecutive_failures += 1;
        if self.consecutive_failures < threshold {
            return;
        }
        let overage = self.consecutive_failures - threshold;
        let backoff = base
            .checked_mul(1u32.checked_shl(overage).unwrap_or(u32::MAX))
            .unwrap_or(max)
            .min(max);
        self.cooldown_until = Some(now + backoff);
        self.cooldown_owner = Some(CooldownOwner::Router);
    }

    pub fn set_cooldown(&mut self, until: Option<Instant>, owner: CooldownOwner) {
        self.cooldown_until = until;
        self.cooldown_owner = if until.is_some() { Some(owner) } else { None };
    }

    /// Only clears a cooldown this owner itself placed — a prober probe
    /// succeeding must not erase a router-set failure cooldown, and vice
    /// versa.
    pub fn clear_if_owned_by(&mut self, owner: CooldownOwner) {
        if self.cooldown_owner == Some(owner) {
            self.cooldown_until = None;
            self.cooldown_owner = None;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DeploymentStatsSnapshot {
    pub consecutive_failures: u32,
    pub ewma_latency_ms: f64,
    pub cooling_down: bool,
}
