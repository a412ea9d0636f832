//! Resolves an `AuthContext` from either an `Authorization: Bearer` API key
//! or a signed session cookie (spec.md §4.G). Grounded on the teacher's
//! `handler.rs` request-entry auth check, generalized from its single
//! admin-key comparison to a full principal lookup against `Store`.

use std::sync::Arc;

use axum_extra::extract::CookieJar;
use http::HeaderMap;
use relaygate_common::GatewayError;
use relaygate_governance::{ApiKeyContext, AuthContext, BudgetPrincipal, SessionCodec};
use relaygate_storage::Store;

const SESSION_COOKIE_NAME: &str = "relaygate_session";

/// Hashes an API key the same way it was hashed at creation time, so a
/// lookup can go straight to `Store::find_api_key_by_hash` without ever
/// keeping the raw key around longer than this call.
pub fn hash_api_key(raw: &str) -> String {
    blake3::hash(raw.as_bytes()).to_hex().to_string()
}

pub async fn resolve_auth_context(
    headers: &HeaderMap,
    cookies: &CookieJar,
    store: &dyn Store,
    session_codec: &SessionCodec,
) -> Result<AuthContext, GatewayError> {
    if let Some(raw_key) = bearer_token(headers) {
        return resolve_from_api_key(&raw_key, store).await;
    }

    if let Some(cookie) = cookies.get(SESSION_COOKIE_NAME) {
        return resolve_from_session(cookie.value(), store, session_codec).await;
    }

    Err(GatewayError::authentication("missing credentials"))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    value.strip_prefix("Bearer ").map(|s| s.trim().to_string())
}

async fn resolve_from_api_key(raw_key: &str, store: &dyn Store) -> Result<AuthContext, GatewayError> {
    let key_hash = hash_api_key(raw_key);
    let model = store
        .find_api_key_by_hash(&key_hash)
        .await
        .map_err(|e| GatewayError::internal(format!("api key lookup failed: {e}")))?
        .ok_or_else(|| GatewayError::authentication("invalid api key"))?;

    if !model.enabled {
        return Err(GatewayError::authentication("api key disabled"));
    }

    let allowed_models: Vec<String> = serde_json::from_value(model.allowed_models.clone()).unwrap_or_default();
    let api_key = ApiKeyContext {
        id: model.id.to_string(),
        allowed_models,
        rpm: model.rpm.map(|v| v as u32),
        burst: model.burst.map(|v| v as u32),
        tpm: model.tpm.map(|v| v as u32),
    };

    let mut budgets = vec![BudgetPrincipal::new(
        "api_key",
        model.id.to_string(),
        model.max_budget,
        model.spent_budget,
    )];

    let mut user_id = None;
    let mut email = None;
    let mut role = None;
    let mut team_id = model.team_id.map(|id| id.to_string());
    let mut org_id = model.org_id.map(|id| id.to_string());

    if let Some(uid) = model.user_id {
        if let Some(user) = store
            .find_user(uid)
            .await
            .map_err(|e| GatewayError::internal(format!("user lookup failed: {e}")))?
        {
            user_id = Some(user.id.to_string());
            email = Some(user.email.clone());
            role = Some(user.role.clone());
            team_id = team_id.or_else(|| user.team_id.map(|id| id.to_string()));
            org_id = org_id.or_else(|| user.org_id.map(|id| id.to_string()));
            budgets.push(BudgetPrincipal::new(
                "user",
                user.id.to_string(),
                user.max_budget,
                user.spent_budget,
            ));
        }
    }

    Ok(AuthContext {
        user_id,
        email,
        role,
        team_id: team_id.clone(),
        team_ids: team_id.into_iter().collect(),
        org_id,
        end_user_id: None,
        sso_user_id: None,
        api_key: Some(api_key),
        budgets,
    })
}

async fn resolve_from_session(
    token: &str,
    store: &dyn Store,
    session_codec: &SessionCodec,
) -> Result<AuthContext, GatewayError> {
    let claims = session_codec
        .verify(token)
        .map_err(|e| GatewayError::authentication(format!("invalid session: {e}")))?;

    let mut budgets = Vec::new();
    let uid = uuid::Uuid::parse_str(&claims.user_id)
        .map_err(|_| GatewayError::authentication("malformed session subject"))?;
    if let Some(user) = store
        .find_user(uid)
        .await
        .map_err(|e| GatewayError::internal(format!("user lookup failed: {e}")))?
    {
        budgets.push(BudgetPrincipal::new(
            "user",
            user.id.to_string(),
            user.max_budget,
            user.spent_budget,
        ));
    }

    Ok(AuthContext {
        user_id: Some(claims.user_id),
        email: Some(claims.email),
        role: Some(claims.role),
        team_id: claims.team_id,
        team_ids: claims.team_ids,
        org_id: claims.org_id,
        end_user_id: claims.end_user_id,
        sso_user_id: claims.sso_user_id,
        api_key: None,
        budgets,
    })
}

/// Used by the request-scoped state to wrap `Arc<dyn Store>` in a single
/// place; avoids every handler re-spelling the trait object type.
pub type SharedStore = Arc<dyn Store>;
