use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "usage_logs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique_key = "usage_log_request_id")]
    pub request_id: String,
    pub api_key_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub end_user_id: Option<String>,
    pub model: String,
    pub call_type: String,
    pub tags: Json,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost: Option<f64>,
    pub latency_ms: i64,
    pub status: i32,
    pub created_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
