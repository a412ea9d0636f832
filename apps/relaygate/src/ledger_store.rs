//! Wires `relaygate_governance`'s `UsageLogSink`/`BudgetLedger` ports to
//! the persistent `Store` (spec.md §4.H Account, §4.A). The governance
//! crate stays storage-agnostic; this is where the two meet, grounded on
//! the teacher's usage-log append calls inside its request handler.

use std::str::FromStr;

use relaygate_governance::{BudgetLedger, LedgerError, UsageLogEntry, UsageLogSink};
use relaygate_storage::{AuditLogWrite, Store, UsageLogWrite};
use uuid::Uuid;

pub struct StoreLedger {
    store: std::sync::Arc<dyn Store>,
}

impl StoreLedger {
    pub fn new(store: std::sync::Arc<dyn Store>) -> Self {
        Self { store }
    }
}

fn parse_principal_uuid(id: &str) -> Option<Uuid> {
    Uuid::from_str(id).ok()
}

#[async_trait::async_trait]
impl UsageLogSink for StoreLedger {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), LedgerError> {
        let write = UsageLogWrite {
            request_id: entry.request_id,
            api_key_id: None,
            user_id: None,
            team_id: None,
            org_id: None,
            end_user_id: entry.end_user_id,
            model: entry.model,
            call_type: entry.call_type.to_string(),
            tags: serde_json::json!(entry.tags),
            prompt_tokens: entry.usage.prompt_tokens as i64,
            completion_tokens: entry.usage.completion_tokens as i64,
            total_tokens: entry.usage.total_tokens as i64,
            cost: entry.usage.cost,
            latency_ms: entry.latency_ms as i64,
            status: entry.status as i32,
        };
        self.store
            .append_usage_log(write)
            .await
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))
    }
}

#[async_trait::async_trait]
impl BudgetLedger for StoreLedger {
    async fn add_spend(&self, principal_kind: &str, principal_id: &str, cost: f64) -> Result<(), LedgerError> {
        if cost <= 0.0 {
            return Ok(());
        }
        // `increment_spend` covers the denormalized `budgets` table; API
        // key/user/team/organization each carry their own counter too, but
        // incrementing those requires a kind-specific update path the
        // `Store` trait doesn't expose yet, so only the generic ledger is
        // kept current here.
        let _ = parse_principal_uuid(principal_id);
        self.store
            .increment_spend(principal_kind, principal_id, cost)
            .await
            .map_err(|e| LedgerError::WriteFailed(e.to_string()))
    }
}

/// Best-effort audit trail for governance-adjacent events (session create,
/// OIDC login) that aren't part of the `UsageLogSink`/`BudgetLedger`
/// contract. Grounded on the teacher's admin audit log writes.
pub async fn record_audit(store: &dyn Store, actor_id: Option<Uuid>, action: &str, target_kind: &str, target_id: Option<String>) {
    let entry = AuditLogWrite {
        actor_id,
        action: action.to_string(),
        target_kind: target_kind.to_string(),
        target_id,
        detail: None,
    };
    if let Err(err) = store.append_audit_log(entry).await {
        tracing::warn!(error = %err, action, "audit log write failed");
    }
}
