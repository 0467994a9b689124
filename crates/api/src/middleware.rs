use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{MatchedPath, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{Instrument, info, info_span};

use spadesk_auth::{JwtValidator, TokenKind};
use spadesk_infra::{Metrics, SessionStore};

use crate::app::errors::ApiError;
use crate::context::{PrincipalContext, TenantContext};

#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtValidator,
    pub sessions: Arc<dyn SessionStore>,
}

/// Require a valid access token whose session has not been revoked.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(req.headers())?;
    let now = Utc::now();

    let claims = state.jwt.validate(token, TokenKind::Access, now)?;
    if !state.sessions.is_live(claims.session_id, now).await? {
        return Err(ApiError::unauthenticated("session has ended"));
    }

    req.extensions_mut()
        .insert(TenantContext::new(claims.tenant_id));
    req.extensions_mut().insert(PrincipalContext::new(
        claims.sub,
        claims.roles,
        claims.session_id,
    ));

    Ok(next.run(req).await)
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?;

    let header = header
        .to_str()
        .map_err(|_| ApiError::unauthenticated("malformed authorization header"))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?
        .trim();
    if token.is_empty() {
        return Err(ApiError::unauthenticated("missing bearer token"));
    }

    Ok(token)
}

/// Request span plus the HTTP request counter and latency histogram.
pub async fn track_requests(
    State(metrics): State<Metrics>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let span = info_span!("http_request", %method, %route);
    let started = Instant::now();
    let response = next.run(req).instrument(span.clone()).await;
    let elapsed = started.elapsed();

    let status = response.status().as_u16();
    metrics.observe_request(&method, &route, status, elapsed.as_secs_f64());
    span.in_scope(|| {
        info!(status, latency_ms = elapsed.as_millis() as u64, "request completed");
    });

    response
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use axum::http::header::AUTHORIZATION;

    use super::*;

    #[test]
    fn bearer_token_is_required() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer   "));
        assert!(extract_bearer(&headers).is_err());

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_bearer(&headers).unwrap(), "abc.def");
    }
}
