use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Denormalized spend counter for a principal kind not already covered by
/// an owning table (`api_keys`/`users`/`teams`/`organizations` each carry
/// their own `max_budget`/`spent_budget` pair); this table is the ledger
/// for anything keyed only by `(principal_kind, principal_id)`, e.g. an
/// end user's rollup across every team it was called through.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "budgets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    #[sea_orm(unique_key = "budget_principal")]
    pub principal_kind: String,
    #[sea_orm(unique_key = "budget_principal")]
    pub principal_id: String,
    pub max_budget: Option<f64>,
    pub spent_budget: f64,
    pub period_start: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ActiveModelBehavior for ActiveModel {}
