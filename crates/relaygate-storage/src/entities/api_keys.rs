use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique_key = "api_key_hash")]
    pub key_hash: String,
    pub user_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub allowed_models: Json,
    pub rpm: Option<i32>,
    pub burst: Option<i32>,
    pub tpm: Option<i32>,
    pub max_budget: Option<f64>,
    pub spent_budget: f64,
    pub enabled: bool,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "SetNull")]
    pub user: HasOne<super::users::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
