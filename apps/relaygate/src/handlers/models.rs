//! `GET /v1/models` (spec.md §4.I). Lists the models reachable through the
//! router's current deployment list, narrowed by the caller's API key
//! model allowlist the same way the governance engine enforces it per call.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Serialize;

use crate::error_response::ApiError;
use crate::handlers::authenticate;
use crate::state::AppState;

#[derive(Debug, Serialize)]
struct ModelEntry {
    id: String,
    object: &'static str,
    owned_by: String,
}

#[derive(Debug, Serialize)]
struct ModelList {
    object: &'static str,
    data: Vec<ModelEntry>,
}

pub async fn list_models(State(state): State<Arc<AppState>>, headers: HeaderMap, cookies: CookieJar) -> Response {
    match handle(state, headers, cookies).await {
        Ok(response) => response.into_response(),
        Err(err) => err.into_response(),
    }
}

async fn handle(state: Arc<AppState>, headers: HeaderMap, cookies: CookieJar) -> Result<axum::Json<ModelList>, ApiError> {
    let auth = authenticate(&state, &headers, &cookies).await?;

    let mut seen = BTreeSet::new();
    let mut data = Vec::new();
    for deployment in state.router.list_deployments() {
        let allowed = auth
            .api_key
            .as_ref()
            .map(|key| key.allows_model(&deployment.model_name))
            .unwrap_or(true);
        if !allowed || !seen.insert(deployment.model_name.clone()) {
            continue;
        }
        data.push(ModelEntry {
            id: deployment.model_name,
            object: "model",
            owned_by: deployment.provider_name,
        });
    }

    Ok(axum::Json(ModelList { object: "list", data }))
}
