use std::sync::Arc;
use std::time::Duration;

use relaygate_common::{GatewayError, GovernanceConfig};
use relaygate_protocol::{CallType, Usage};

use crate::context::AuthContext;
use crate::idempotency::IdempotencyStore;
use crate::ledger::{BudgetLedger, UsageLogEntry, UsageLogSink};
use crate::rate_limit::RateLimiterBackend;

pub struct RequestInput<'a> {
    pub model: &'a str,
    pub call_type: CallType,
    pub end_user_id: Option<&'a str>,
    pub tags: &'a [String],
    /// Rough token estimate for the request body, checked against the
    /// tenant's TPM budget alongside the RPM check (spec.md §4.H).
    pub estimated_input_tokens: u32,
}

pub struct AccountInput {
    pub request_id: String,
    pub model: String,
    pub call_type: CallType,
    pub end_user_id: Option<String>,
    pub tags: Vec<String>,
    pub usage: Usage,
    pub start: time::OffsetDateTime,
    pub latency_ms: u64,
    pub status: u16,
}

/// Brackets each LLM call (spec.md §4.H). If the engine is disabled,
/// `evaluate` still enforces model access unconditionally — every other
/// gate is skipped, and `account` still best-effort logs usage.
pub struct GovernanceEngine {
    config: GovernanceConfig,
    rate_limiter: RateLimiterBackend,
    idempotency: Arc<dyn IdempotencyStore>,
    usage_sink: Arc<dyn UsageLogSink>,
    budget_ledger: Arc<dyn BudgetLedger>,
    accounting_timeout: Duration,
}

impl GovernanceEngine {
    pub fn new(
        config: GovernanceConfig,
        rate_limiter: RateLimiterBackend,
        idempotency: Arc<dyn IdempotencyStore>,
        usage_sink: Arc<dyn UsageLogSink>,
        budget_ledger: Arc<dyn BudgetLedger>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            idempotency,
            usage_sink,
            budget_ledger,
            accounting_timeout: Duration::from_secs(5),
        }
    }

    pub async fn evaluate(&self, ctx: &AuthContext, input: &RequestInput<'_>) -> Result<(), GatewayError> {
        // 1. Model access — unconditional, even if the engine is disabled.
        if let Some(api_key) = &ctx.api_key
            && !api_key.allows_model(input.model)
        {
            return Err(GatewayError::permission_denied(format!(
                "model {} is not allowed for this API key",
                input.model
            )));
        }

        if !self.config.enabled {
            return Ok(());
        }

        // 2. Budget, across every known principal.
        for principal in &ctx.budgets {
            if principal.is_over_budget() {
                return Err(GatewayError::insufficient_quota(format!(
                    "{} has exceeded its budget",
                    principal.kind
                )));
            }
        }

        // 3. Rate limit, keyed on tenant scope: request count, then tokens.
        let tenant = ctx.tenant_scope().unwrap_or_else(|| "anonymous".to_string());
        if !self.rate_limiter.check(&tenant).await {
            return Err(GatewayError::rate_limited("rate limit exceeded"));
        }
        if !self.rate_limiter.check_tokens(&tenant, input.estimated_input_tokens).await {
            return Err(GatewayError::rate_limited("token rate limit exceeded"));
        }

        Ok(())
    }

    /// Records usage exactly once per `request_id`; writes run async and
    /// never propagate failure back to the in-band response.
    pub async fn account(&self, ctx: &AuthContext, input: AccountInput) {
        let ttl = Duration::from_secs(self.config.idempotency_window_s.max(1));
        match self.idempotency.put_if_absent(&input.request_id, ttl).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(err) => {
                tracing::warn!(error = %err, request_id = %input.request_id, "idempotency check failed, accounting once anyway");
            }
        }

        let principals: Vec<(&'static str, String)> = [
            ctx.api_key.as_ref().map(|k| ("api_key", k.id.clone())),
            ctx.user_id.as_ref().map(|id| ("user", id.clone())),
            ctx.team_id.as_ref().map(|id| ("team", id.clone())),
            ctx.org_id.as_ref().map(|id| ("organization", id.clone())),
            input.end_user_id.as_ref().map(|id| ("end_user", id.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        let run = {
            let usage_sink = Arc::clone(&self.usage_sink);
            let budget_ledger = Arc::clone(&self.budget_ledger);
            let timeout = self.accounting_timeout;
            let cost = input.usage.cost.unwrap_or(0.0);
            let entry = UsageLogEntry {
                request_id: input.request_id.clone(),
                model: input.model,
                call_type: input.call_type,
                end_user_id: input.end_user_id,
                tags: input.tags,
                usage: input.usage,
                start: input.start,
                latency_ms: input.latency_ms,
                status: input.status,
            };
            async move {
                if let Err(err) = tokio::time::timeout(timeout, usage_sink.append(entry)).await {
                    tracing::warn!(error = %err, "usage log write timed out");
                }
                for (kind, id) in principals {
                    let result = tokio::time::timeout(timeout, budget_ledger.add_spend(kind, &id, cost)).await;
                    if let Err(err) = result {
                        tracing::warn!(principal_kind = kind, error = %err, "budget spend write timed out");
                    }
                }
            }
        };

        if self.config.async_accounting {
            tokio::spawn(run);
        } else {
            run.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ApiKeyContext;
    use crate::idempotency::InMemoryIdempotencyStore;
    use crate::ledger::NoopLedger;
    use crate::rate_limit::LocalRateLimiter;

    fn engine(config: GovernanceConfig) -> GovernanceEngine {
        GovernanceEngine::new(
            config,
            RateLimiterBackend::Local(LocalRateLimiter::new(600, 60)),
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::new(NoopLedger),
            Arc::new(NoopLedger),
        )
    }

    #[tokio::test]
    async fn model_access_is_enforced_even_when_disabled() {
        let mut config = GovernanceConfig::default();
        config.enabled = false;
        let engine = engine(config);

        let ctx = AuthContext {
            api_key: Some(ApiKeyContext {
                id: "key-1".into(),
                allowed_models: vec!["gpt-4o".into()],
                rpm: None,
                burst: None,
                tpm: None,
            }),
            ..Default::default()
        };

        let input = RequestInput {
            model: "claude-3-5-sonnet-latest",
            call_type: CallType::Chat,
            end_user_id: None,
            tags: &[],
            estimated_input_tokens: 0,
        };

        let err = engine.evaluate(&ctx, &input).await.unwrap_err();
        assert_eq!(err.kind, relaygate_common::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn token_rate_limit_is_enforced_alongside_request_count() {
        let engine = GovernanceEngine::new(
            GovernanceConfig::default(),
            RateLimiterBackend::Local(LocalRateLimiter::new(600, 60).with_tpm(1000)),
            Arc::new(InMemoryIdempotencyStore::new()),
            Arc::new(NoopLedger),
            Arc::new(NoopLedger),
        );
        let ctx = AuthContext::default();
        let input = RequestInput {
            model: "gpt-4o",
            call_type: CallType::Chat,
            end_user_id: None,
            tags: &[],
            estimated_input_tokens: 2000,
        };
        let err = engine.evaluate(&ctx, &input).await.unwrap_err();
        assert_eq!(err.kind, relaygate_common::ErrorKind::RateLimitExceeded);
    }

    #[tokio::test]
    async fn over_budget_principal_is_rejected() {
        let engine = engine(GovernanceConfig::default());
        let ctx = AuthContext {
            budgets: vec![crate::context::BudgetPrincipal::new("team", "t1", Some(10.0), 10.0)],
            ..Default::default()
        };
        let input = RequestInput {
            model: "gpt-4o",
            call_type: CallType::Chat,
            end_user_id: None,
            tags: &[],
            estimated_input_tokens: 0,
        };
        let err = engine.evaluate(&ctx, &input).await.unwrap_err();
        assert_eq!(err.kind, relaygate_common::ErrorKind::InsufficientQuota);
    }

    #[tokio::test]
    async fn account_is_idempotent_per_request_id() {
        let engine = engine(GovernanceConfig::default());
        let ctx = AuthContext::default();
        let account_input = |request_id: &str| AccountInput {
            request_id: request_id.to_string(),
            model: "gpt-4o".into(),
            call_type: CallType::Chat,
            end_user_id: None,
            tags: vec![],
            usage: Usage::default(),
            start: time::OffsetDateTime::UNIX_EPOCH,
            latency_ms: 10,
            status: 200,
        };
        // Exercised purely for its idempotency side effect, twice.
        engine.account(&ctx, account_input("req-1")).await;
        engine.account(&ctx, account_input("req-1")).await;
    }
}
