//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, sessions, token issuing, metrics, background tasks
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request DTOs, their validation and JSON views
//! - `errors.rs`: the error type every handler returns
//! - `extract.rs`: extractors whose rejections use that error type

use std::sync::Arc;

use axum::{Extension, Router, middleware::from_fn_with_state, routing::get};
use tower::ServiceBuilder;

use spadesk_infra::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod extract;
pub mod routes;
pub mod services;

use services::{AppServices, BootstrapError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, BootstrapError> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(build_app_with_services(services))
}

/// Router over already built services.
pub fn build_app_with_services(services: Arc<AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        jwt: services.validator.clone(),
        sessions: services.sessions.clone(),
    };

    // Protected routes: require a live session + tenant context.
    let protected = routes::router().route_layer(from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let metrics = services.metrics.clone();
    Router::new()
        .route("/health", get(routes::system::health))
        .route("/metrics", get(routes::system::metrics))
        .nest("/v1", routes::public_router().merge(protected))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn_with_state(metrics, middleware::track_requests))
                .layer(Extension(services)),
        )
}
