use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique_key = "user_email")]
    pub email: String,
    pub role: String,
    pub team_id: Option<Uuid>,
    pub org_id: Option<Uuid>,
    pub sso_user_id: Option<String>,
    pub max_budget: Option<f64>,
    pub spent_budget: f64,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "team_id", to = "id", on_delete = "SetNull")]
    pub team: HasOne<super::teams::Entity>,
    #[sea_orm(has_many)]
    pub api_keys: HasMany<super::api_keys::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
