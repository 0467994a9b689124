use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{StatusCode, header},
    response::IntoResponse,
    Json,
};

use crate::app::errors::ApiError;
use crate::app::routes::common::ApiResult;
use crate::app::services::AppServices;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Prometheus text exposition.
pub async fn metrics(Extension(services): Extension<Arc<AppServices>>) -> ApiResult {
    let body = services
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
