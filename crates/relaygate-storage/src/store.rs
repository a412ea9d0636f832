use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::{api_keys, budgets, end_users, invitation_links, organizations, sessions, teams, users};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("db error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("serde json error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct UsageLogWrite {
    pub request_id: String,
    pub api_key_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub end_user_id: Option<String>,
    pub model: String,
    pub call_type: String,
    pub tags: serde_json::Value,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost: Option<f64>,
    pub latency_ms: i64,
    pub status: i32,
}

#[derive(Debug, Clone)]
pub struct AuditLogWrite {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub target_kind: String,
    pub target_id: Option<String>,
    pub detail: Option<serde_json::Value>,
}

/// The single persistence seam the governance engine and the admin/session
/// surfaces read and write through. The management surface built on top of
/// this (`/key/*`, `/team/*`, `/user/*`, `/organization/*`, `/spend/*`,
/// `/control/*`, `/audit/*`, `/invitation/*`) is out of scope here; only the
/// operations the request-handling core depends on are part of the
/// contract.
#[async_trait]
pub trait Store: Send + Sync {
    async fn sync(&self) -> StorageResult<()>;

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StorageResult<Option<api_keys::Model>>;
    async fn touch_api_key_last_used(&self, id: Uuid, at: OffsetDateTime) -> StorageResult<()>;

    async fn find_user(&self, id: Uuid) -> StorageResult<Option<users::Model>>;
    async fn find_team(&self, id: Uuid) -> StorageResult<Option<teams::Model>>;
    async fn find_organization(&self, id: Uuid) -> StorageResult<Option<organizations::Model>>;

    async fn find_or_create_end_user(
        &self,
        external_id: &str,
        team_id: Option<Uuid>,
    ) -> StorageResult<end_users::Model>;

    /// Resolves the user record for a verified OIDC login, creating one on
    /// first sign-in. Matches on `sso_user_id` (the issuer's `sub` claim)
    /// first, falling back to `email` for a user provisioned another way
    /// (invitation link, admin-created) who is signing in via SSO for the
    /// first time.
    async fn find_or_create_sso_user(
        &self,
        sso_user_id: &str,
        email: &str,
    ) -> StorageResult<users::Model>;

    async fn find_budget(&self, principal_kind: &str, principal_id: &str) -> StorageResult<Option<budgets::Model>>;
    async fn increment_spend(&self, principal_kind: &str, principal_id: &str, amount: f64) -> StorageResult<()>;

    async fn append_usage_log(&self, entry: UsageLogWrite) -> StorageResult<()>;
    async fn append_audit_log(&self, entry: AuditLogWrite) -> StorageResult<()>;

    async fn create_session(
        &self,
        user_id: Uuid,
        claims_json: serde_json::Value,
        expires_at: OffsetDateTime,
    ) -> StorageResult<Uuid>;
    async fn find_session(&self, id: Uuid) -> StorageResult<Option<sessions::Model>>;
    async fn delete_session(&self, id: Uuid) -> StorageResult<()>;

    async fn create_invitation_link(
        &self,
        org_id: Option<Uuid>,
        team_id: Option<Uuid>,
        role: &str,
        email: Option<&str>,
        expires_at: OffsetDateTime,
    ) -> StorageResult<invitation_links::Model>;
    async fn find_invitation_link_by_token(&self, token: &str) -> StorageResult<Option<invitation_links::Model>>;
    async fn accept_invitation_link(&self, token: &str, accepted_at: OffsetDateTime) -> StorageResult<()>;
}
