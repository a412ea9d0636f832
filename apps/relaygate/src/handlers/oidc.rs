//! `GET /oidc/login` and `GET /oidc/callback` (spec.md §4.G). PKCE state
//! rides in a short-lived cookie between the two legs instead of a server
//! side store, matching the stateless-handler shape the rest of this crate
//! uses. JWKS fetch/caching is out of scope (see `relaygate_governance::oidc`'s
//! doc comment); the issuer's `client_secret` is used as an HS256 shared
//! secret to verify the ID token, which only fits issuers configured for
//! that mode and is recorded as a simplification in DESIGN.md.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use jsonwebtoken::{Algorithm, DecodingKey};
use relaygate_common::GatewayError;
use relaygate_governance::{authorize_url, check_state, verify_id_token, PkceState, SessionClaims};
use serde::Deserialize;

use crate::error_response::ApiError;
use crate::state::AppState;

const STATE_COOKIE_NAME: &str = "relaygate_oidc_state";
const SESSION_COOKIE_NAME: &str = "relaygate_session";
const STATE_COOKIE_TTL_SECS: i64 = 600;
const SESSION_TTL_SECS: i64 = 12 * 3600;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

pub async fn login(State(state): State<Arc<AppState>>, cookies: CookieJar) -> Response {
    match handle_login(state, cookies).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_login(state: Arc<AppState>, cookies: CookieJar) -> Result<Response, ApiError> {
    let config = state.config.load_full();
    let oidc = config
        .auth
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError(GatewayError::invalid_request("sso is not configured")))?;

    let pkce = PkceState::generate();
    let redirect_url = authorize_url(oidc, &pkce);

    let payload = serde_json::to_string(&pkce)
        .map_err(|e| ApiError(GatewayError::internal(format!("failed encoding oidc state: {e}"))))?;
    let mut cookie = Cookie::new(STATE_COOKIE_NAME, payload);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_secure(config.auth.session.cookie_secure);
    cookie.set_path("/oidc");
    cookie.set_max_age(time::Duration::seconds(STATE_COOKIE_TTL_SECS));

    let cookies = cookies.add(cookie);
    Ok((cookies, Redirect::temporary(&redirect_url)).into_response())
}

pub async fn callback(
    State(state): State<Arc<AppState>>,
    cookies: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Response {
    match handle_callback(state, cookies, params).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle_callback(
    state: Arc<AppState>,
    cookies: CookieJar,
    params: CallbackParams,
) -> Result<Response, ApiError> {
    if let Some(error) = params.error {
        return Err(ApiError(GatewayError::authentication(format!(
            "oidc provider returned an error: {error}"
        ))));
    }
    let code = params
        .code
        .ok_or_else(|| ApiError(GatewayError::invalid_request("missing authorization code")))?;
    let received_state = params
        .state
        .ok_or_else(|| ApiError(GatewayError::invalid_request("missing state parameter")))?;

    let config = state.config.load_full();
    let oidc = config
        .auth
        .oidc
        .as_ref()
        .ok_or_else(|| ApiError(GatewayError::invalid_request("sso is not configured")))?;

    let state_cookie = cookies
        .get(STATE_COOKIE_NAME)
        .ok_or_else(|| ApiError(GatewayError::authentication("missing oidc state cookie")))?;
    let pkce: PkceState = serde_json::from_str(state_cookie.value())
        .map_err(|_| ApiError(GatewayError::authentication("malformed oidc state cookie")))?;
    check_state(&pkce.state, &received_state).map_err(|e| ApiError(GatewayError::authentication(e.to_string())))?;

    let id_token = exchange_code(oidc, &code, &pkce.code_verifier).await?;

    let decoding_key = DecodingKey::from_secret(oidc.client_secret.as_bytes());
    let claims = verify_id_token(&id_token, &decoding_key, Algorithm::HS256, oidc, &pkce.nonce)
        .map_err(|e| ApiError(GatewayError::authentication(format!("id token rejected: {e}"))))?;
    let email = claims
        .email
        .ok_or_else(|| ApiError(GatewayError::authentication("id token did not include an email claim")))?;

    let user = state
        .store
        .find_or_create_sso_user(&claims.sub, &email)
        .await
        .map_err(|e| ApiError(GatewayError::internal(format!("failed resolving sso user: {e}"))))?;

    let session_claims = SessionClaims {
        user_id: user.id.to_string(),
        email: user.email.clone(),
        role: user.role.clone(),
        team_id: user.team_id.map(|id| id.to_string()),
        team_ids: user.team_id.map(|id| id.to_string()).into_iter().collect(),
        org_id: user.org_id.map(|id| id.to_string()),
        end_user_id: None,
        sso_user_id: Some(claims.sub),
        exp: time::OffsetDateTime::now_utc().unix_timestamp() + SESSION_TTL_SECS,
    };
    let session_token = state
        .session_codec
        .sign(&session_claims)
        .map_err(|e| ApiError(GatewayError::internal(format!("failed signing session: {e}"))))?;

    let mut session_cookie = Cookie::new(SESSION_COOKIE_NAME, session_token);
    session_cookie.set_http_only(true);
    session_cookie.set_same_site(SameSite::Lax);
    session_cookie.set_secure(config.auth.session.cookie_secure);
    session_cookie.set_path("/");
    session_cookie.set_max_age(time::Duration::seconds(SESSION_TTL_SECS));

    let mut expired_state = Cookie::new(STATE_COOKIE_NAME, "");
    expired_state.set_path("/oidc");
    expired_state.set_max_age(time::Duration::seconds(0));

    let cookies = cookies.add(session_cookie).add(expired_state);
    Ok((cookies, Redirect::temporary("/")).into_response())
}

async fn exchange_code(
    oidc: &relaygate_common::OidcConfig,
    code: &str,
    code_verifier: &str,
) -> Result<String, ApiError> {
    let issuer = oidc.issuer_url.trim_end_matches('/');
    let token_url = format!("{issuer}/token");
    let body = form_encode(&[
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", &oidc.redirect_url),
        ("client_id", &oidc.client_id),
        ("client_secret", &oidc.client_secret),
        ("code_verifier", code_verifier),
    ]);

    let client = wreq::Client::builder()
        .build()
        .map_err(|e| ApiError(GatewayError::service_unavailable(format!("failed building oidc client: {e}"))))?;
    let resp = client
        .post(&token_url)
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body)
        .send()
        .await
        .map_err(|e| ApiError(GatewayError::service_unavailable(format!("token exchange failed: {e}"))))?;

    if !resp.status().is_success() {
        return Err(ApiError(GatewayError::authentication("oidc token exchange rejected")));
    }

    let payload: TokenResponse = resp
        .json()
        .await
        .map_err(|e| ApiError(GatewayError::authentication(format!("malformed token response: {e}"))))?;
    Ok(payload.id_token)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: String,
}

fn form_encode(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_encode_escapes_reserved_bytes() {
        assert_eq!(form_encode(&[("a", "one two")]), "a=one%20two");
    }
}
