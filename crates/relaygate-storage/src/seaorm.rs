use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, Schema,
};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entities::{
    self, api_keys, budgets, end_users, invitation_links, organizations, sessions, teams, usage_logs, users,
};
use crate::store::{AuditLogWrite, Store, StorageError, StorageResult, UsageLogWrite};

#[derive(Clone)]
pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let db = crate::db::connect_shared(dsn).await?;
        Ok(Self { db })
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl Store for SeaOrmStore {
    async fn sync(&self) -> StorageResult<()> {
        Schema::new(self.db.get_database_backend())
            .builder()
            .register(entities::Organizations)
            .register(entities::Teams)
            .register(entities::Users)
            .register(entities::ApiKeys)
            .register(entities::EndUsers)
            .register(entities::Budgets)
            .register(entities::UsageLogs)
            .register(entities::AuditLogs)
            .register(entities::Sessions)
            .register(entities::InvitationLinks)
            .sync(&self.db)
            .await?;
        Ok(())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> StorageResult<Option<api_keys::Model>> {
        Ok(entities::ApiKeys::find()
            .filter(api_keys::Column::KeyHash.eq(key_hash))
            .one(&self.db)
            .await?)
    }

    async fn touch_api_key_last_used(&self, id: Uuid, at: OffsetDateTime) -> StorageResult<()> {
        let existing = entities::ApiKeys::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("api key {id}")))?;
        let mut active: api_keys::ActiveModel = existing.into();
        active.last_used_at = ActiveValue::Set(Some(at));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn find_user(&self, id: Uuid) -> StorageResult<Option<users::Model>> {
        Ok(entities::Users::find_by_id(id).one(&self.db).await?)
    }

    async fn find_team(&self, id: Uuid) -> StorageResult<Option<teams::Model>> {
        Ok(entities::Teams::find_by_id(id).one(&self.db).await?)
    }

    async fn find_organization(&self, id: Uuid) -> StorageResult<Option<organizations::Model>> {
        Ok(entities::Organizations::find_by_id(id).one(&self.db).await?)
    }

    async fn find_or_create_end_user(
        &self,
        external_id: &str,
        team_id: Option<Uuid>,
    ) -> StorageResult<end_users::Model> {
        if let Some(existing) = entities::EndUsers::find()
            .filter(end_users::Column::ExternalId.eq(external_id))
            .one(&self.db)
            .await?
        {
            return Ok(existing);
        }

        let now = OffsetDateTime::now_utc();
        let active = end_users::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            external_id: ActiveValue::Set(external_id.to_string()),
            team_id: ActiveValue::Set(team_id),
            max_budget: ActiveValue::Set(None),
            spent_budget: ActiveValue::Set(0.0),
            created_at: ActiveValue::Set(now),
        };
        Ok(active.insert(&self.db).await?)
    }

    async fn find_or_create_sso_user(&self, sso_user_id: &str, email: &str) -> StorageResult<users::Model> {
        if let Some(existing) = entities::Users::find()
            .filter(users::Column::SsoUserId.eq(sso_user_id))
            .one(&self.db)
            .await?
        {
            return Ok(existing);
        }

        if let Some(existing) = entities::Users::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await?
        {
            let mut active: users::ActiveModel = existing.into();
            active.sso_user_id = ActiveValue::Set(Some(sso_user_id.to_string()));
            return Ok(active.update(&self.db).await?);
        }

        let now = OffsetDateTime::now_utc();
        let active = users::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            email: ActiveValue::Set(email.to_string()),
            role: ActiveValue::Set("member".to_string()),
            team_id: ActiveValue::Set(None),
            org_id: ActiveValue::Set(None),
            sso_user_id: ActiveValue::Set(Some(sso_user_id.to_string())),
            max_budget: ActiveValue::Set(None),
            spent_budget: ActiveValue::Set(0.0),
            created_at: ActiveValue::Set(now),
        };
        Ok(active.insert(&self.db).await?)
    }

    async fn find_budget(&self, principal_kind: &str, principal_id: &str) -> StorageResult<Option<budgets::Model>> {
        Ok(entities::Budgets::find()
            .filter(
                Condition::all()
                    .add(budgets::Column::PrincipalKind.eq(principal_kind))
                    .add(budgets::Column::PrincipalId.eq(principal_id)),
            )
            .one(&self.db)
            .await?)
    }

    async fn increment_spend(&self, principal_kind: &str, principal_id: &str, amount: f64) -> StorageResult<()> {
        let now = OffsetDateTime::now_utc();
        let existing = entities::Budgets::find()
            .filter(
                Condition::all()
                    .add(budgets::Column::PrincipalKind.eq(principal_kind))
                    .add(budgets::Column::PrincipalId.eq(principal_id)),
            )
            .one(&self.db)
            .await?;

        match existing {
            Some(row) => {
                let spent = row.spent_budget;
                let mut active: budgets::ActiveModel = row.into();
                active.spent_budget = ActiveValue::Set(spent + amount);
                active.updated_at = ActiveValue::Set(now);
                active.update(&self.db).await?;
            }
            None => {
                let active = budgets::ActiveModel {
                    id: ActiveValue::Set(Uuid::new_v4()),
                    principal_kind: ActiveValue::Set(principal_kind.to_string()),
                    principal_id: ActiveValue::Set(principal_id.to_string()),
                    max_budget: ActiveValue::Set(None),
                    spent_budget: ActiveValue::Set(amount),
                    period_start: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                active.insert(&self.db).await?;
            }
        }
        Ok(())
    }

    async fn append_usage_log(&self, entry: UsageLogWrite) -> StorageResult<()> {
        let active = usage_logs::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            request_id: ActiveValue::Set(entry.request_id),
            api_key_id: ActiveValue::Set(entry.api_key_id),
            user_id: ActiveValue::Set(entry.user_id),
            team_id: ActiveValue::Set(entry.team_id),
            org_id: ActiveValue::Set(entry.org_id),
            end_user_id: ActiveValue::Set(entry.end_user_id),
            model: ActiveValue::Set(entry.model),
            call_type: ActiveValue::Set(entry.call_type),
            tags: ActiveValue::Set(entry.tags),
            prompt_tokens: ActiveValue::Set(entry.prompt_tokens),
            completion_tokens: ActiveValue::Set(entry.completion_tokens),
            total_tokens: ActiveValue::Set(entry.total_tokens),
            cost: ActiveValue::Set(entry.cost),
            latency_ms: ActiveValue::Set(entry.latency_ms),
            status: ActiveValue::Set(entry.status),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        };
        active.insert(&self.db).await?;
        Ok(())
    }

    async fn append_audit_log(&self, entry: AuditLogWrite) -> StorageResult<()> {
        let active = entities::audit_logs::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            actor_id: ActiveValue::Set(entry.actor_id),
            action: ActiveValue::Set(entry.action),
            target_kind: ActiveValue::Set(entry.target_kind),
            target_id: ActiveValue::Set(entry.target_id),
            detail: ActiveValue::Set(entry.detail),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        };
        active.insert(&self.db).await?;
        Ok(())
    }

    async fn create_session(
        &self,
        user_id: Uuid,
        claims_json: serde_json::Value,
        expires_at: OffsetDateTime,
    ) -> StorageResult<Uuid> {
        let id = Uuid::new_v4();
        let active = sessions::ActiveModel {
            id: ActiveValue::Set(id),
            user_id: ActiveValue::Set(user_id),
            claims_json: ActiveValue::Set(claims_json),
            expires_at: ActiveValue::Set(expires_at),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        };
        active.insert(&self.db).await?;
        Ok(id)
    }

    async fn find_session(&self, id: Uuid) -> StorageResult<Option<sessions::Model>> {
        Ok(entities::Sessions::find_by_id(id).one(&self.db).await?)
    }

    async fn delete_session(&self, id: Uuid) -> StorageResult<()> {
        entities::Sessions::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    async fn create_invitation_link(
        &self,
        org_id: Option<Uuid>,
        team_id: Option<Uuid>,
        role: &str,
        email: Option<&str>,
        expires_at: OffsetDateTime,
    ) -> StorageResult<invitation_links::Model> {
        let active = invitation_links::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            token: ActiveValue::Set(Uuid::new_v4().simple().to_string()),
            org_id: ActiveValue::Set(org_id),
            team_id: ActiveValue::Set(team_id),
            role: ActiveValue::Set(role.to_string()),
            email: ActiveValue::Set(email.map(str::to_string)),
            expires_at: ActiveValue::Set(expires_at),
            accepted_at: ActiveValue::Set(None),
            created_at: ActiveValue::Set(OffsetDateTime::now_utc()),
        };
        Ok(active.insert(&self.db).await?)
    }

    async fn find_invitation_link_by_token(&self, token: &str) -> StorageResult<Option<invitation_links::Model>> {
        Ok(entities::InvitationLinks::find()
            .filter(invitation_links::Column::Token.eq(token))
            .one(&self.db)
            .await?)
    }

    async fn accept_invitation_link(&self, token: &str, accepted_at: OffsetDateTime) -> StorageResult<()> {
        let existing = entities::InvitationLinks::find()
            .filter(invitation_links::Column::Token.eq(token))
            .one(&self.db)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("invitation link {token}")))?;
        let mut active: invitation_links::ActiveModel = existing.into();
        active.accepted_at = ActiveValue::Set(Some(accepted_at));
        active.update(&self.db).await?;
        Ok(())
    }
}
