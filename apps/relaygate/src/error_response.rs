//! Converts `GatewayError` into an axum response. Grounded on the
//! teacher's `handler.rs` error path, which also renders a JSON error body
//! keyed off a stable status code rather than bubbling the raw error type.

use axum::body::Body;
use axum::http::Response;
use axum::response::IntoResponse;
use relaygate_common::GatewayError;

pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response<Body> {
        let status = self.0.status();
        let body = self.0.to_body();
        Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("static response parts are always valid")
    }
}
