use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use serde_json::{Value, json};

use spadesk_core::paginate;

use crate::app::dto::ListQuery;
use crate::app::errors::ApiError;

pub type ApiResult = Result<Response, ApiError>;

pub fn ok(body: Value) -> Response {
    (StatusCode::OK, Json(body)).into_response()
}

pub fn created(body: Value) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

pub fn no_content() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Paginate an already filtered and sorted list and render each item.
pub fn page_of<T>(items: Vec<T>, query: &ListQuery, view: impl Fn(&T) -> Value) -> ApiResult {
    let request = query.page_request()?;
    let page = paginate(items, request).map(|item| view(&item));
    Ok(ok(json!(page)))
}
