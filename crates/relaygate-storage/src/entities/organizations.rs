use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "organizations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique_key = "organization_name")]
    pub name: String,
    pub max_budget: Option<f64>,
    pub spent_budget: f64,
    pub created_at: OffsetDateTime,
    #[sea_orm(has_many)]
    pub teams: HasMany<super::teams::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
