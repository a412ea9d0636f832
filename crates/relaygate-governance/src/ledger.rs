use relaygate_protocol::{CallType, Usage};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger write failed: {0}")]
    WriteFailed(String),
}

/// One row of the durable usage log the handler appends on every accounted
/// call (spec.md §4.H Account). Persistence lives behind `relaygate-storage`
/// in the full app; this crate only defines the shape the sink writes.
#[derive(Debug, Clone)]
pub struct UsageLogEntry {
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

#[async_trait::async_trait]
pub trait UsageLogSink: Send + Sync {
    async fn append(&self, entry: UsageLogEntry) -> Result<(), LedgerError>;
}

/// Atomically adds `cost` to the spent counter of whichever principal kinds
/// are known for a request — `{api_key, user, team, organization, end_user}`
/// (spec.md §4.H Account).
#[async_trait::async_trait]
pub trait BudgetLedger: Send + Sync {
    async fn add_spend(&self, principal_kind: &str, principal_id: &str, cost: f64) -> Result<(), LedgerError>;
}

/// Accepts every write; used where no durable backend is wired yet (local
/// dev, or deployments that opt out of budget enforcement).
#[derive(Default)]
pub struct NoopLedger;

#[async_trait::async_trait]
impl UsageLogSink for NoopLedger {
    async fn append(&self, _entry: UsageLogEntry) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl BudgetLedger for NoopLedger {
    async fn add_spend(&self, _principal_kind: &str, _principal_id: &str, _cost: f64) -> Result<(), LedgerError> {
        Ok(())
    }
}
