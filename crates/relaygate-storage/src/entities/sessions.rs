use sea_orm::entity::prelude::*;
use time::OffsetDateTime;

/// Durable mirror of an issued session cookie, keyed by its JTI so a
/// session can be revoked server-side before its signed claims expire.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub claims_json: Json,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    #[sea_orm(belongs_to, from = "user_id", to = "id", on_delete = "Cascade")]
    pub user: HasOne<super::users::Entity>,
}

impl ActiveModelBehavior for ActiveModel {}
