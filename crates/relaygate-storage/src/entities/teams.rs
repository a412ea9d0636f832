use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "teams")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub org_id: Option<Uuid>,
    pub name: String,
    pub max_budget: Option<f64>,
    pub spent_budget: f64,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "org_id", to = "id", on_delete = "SetNull")]
    pub organization: HasOne<super::organizations::Entity>,
    #[sea_orm(has_many)]
    pub users: HasMany<super::users::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
