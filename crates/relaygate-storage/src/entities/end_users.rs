use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// A downstream identity an API key calls on behalf of — `user` in an
/// OpenAI-style request body, scoped for its own budget and usage rollups.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "end_users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique_key = "end_user_external_id")]
    pub external_id: String,
    pub team_id: Option<Uuid>,
    pub max_budget: Option<f64>,
    pub spent_budget: f64,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "team_id", to = "id", on_delete = "SetNull")]
    pub team: HasOne<super::teams::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
