//! Registration, login and session lifecycle.
//!
//! A login opens one session; its access and refresh tokens share the
//! session id. Refreshing rotates the session, logout revokes it.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use spadesk_accounts::{Account, AccountCommand, AccountProfile};
use spadesk_auth::user::CreateUser;
use spadesk_auth::{Role, TokenKind, User, UserCommand, hash_password, verify_password};
use spadesk_core::validation::normalize_email;
use spadesk_core::{AggregateId, TenantId, UserId};
use spadesk_infra::credentials::Credential;

use crate::app::dto::{self, LoginRequest, RefreshRequest, RegisterRequest};
use crate::app::errors::ApiError;
use crate::app::extract::ApiJson;
use crate::app::routes::common::{ApiResult, created, no_content, ok};
use crate::app::services::AppServices;
use crate::context::{PrincipalContext, TenantContext};

const DEFAULT_CURRENCY: &str = "INR";

/// Unauthenticated endpoints, mounted with full paths.
pub fn public_router() -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

/// Endpoints for an already authenticated caller.
pub fn router() -> Router {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// Open a new tenant: business account plus its first admin user.
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult {
    body.validate()?;
    let now = Utc::now();
    let tenant_id = TenantId::new();
    let user_id = UserId::new();
    let email = normalize_email(&body.email);

    let credentials = &services.backoffice.stores.credentials;
    credentials
        .claim(&email, Credential { tenant_id, user_id })
        .await?;

    let user = match open_tenant(&services, tenant_id, user_id, &email, body, now).await {
        Ok(user) => user,
        Err(err) => {
            if let Err(release) = credentials.release(&email).await {
                warn!(error = %release, "could not release credential after failed registration");
            }
            return Err(err);
        }
    };

    info!(tenant_id = %tenant_id, user_id = %user_id, "tenant registered");
    let tokens = start_session(&services, &user, tenant_id, now).await?;
    Ok(created(json!({
        "tenant_id": tenant_id,
        "user": dto::user_to_json(&user),
        "tokens": tokens,
    })))
}

async fn open_tenant(
    services: &AppServices,
    tenant_id: TenantId,
    user_id: UserId,
    email: &str,
    body: RegisterRequest,
    now: DateTime<Utc>,
) -> Result<User, ApiError> {
    let office = &services.backoffice;
    let display_name = body
        .display_name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| body.business_name.clone());

    office
        .dispatch(
            office.stores.accounts.as_ref(),
            tenant_id,
            AggregateId::from(tenant_id),
            AccountCommand::Open {
                tenant_id,
                profile: AccountProfile {
                    business_name: body.business_name,
                    email: email.to_string(),
                    phone: body.phone,
                    currency: body
                        .currency
                        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
                },
                occurred_at: now,
            },
            Account::empty,
        )
        .await?;

    let password_hash = hash(body.password).await?;
    let user = office
        .dispatch(
            office.stores.users.as_ref(),
            tenant_id,
            user_id,
            UserCommand::Create(CreateUser {
                tenant_id,
                user_id,
                email: email.to_string(),
                display_name,
                password_hash,
                roles: vec![Role::ADMIN],
                occurred_at: now,
            }),
            User::empty,
        )
        .await?;
    Ok(user)
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult {
    let invalid = || ApiError::unauthenticated("invalid credentials");
    let office = &services.backoffice;

    let credential = office
        .stores
        .credentials
        .lookup(&body.email)
        .await?
        .ok_or_else(invalid)?;
    let user = office
        .find(
            office.stores.users.as_ref(),
            credential.tenant_id,
            &credential.user_id,
        )
        .await
        .map_err(|_| invalid())?;

    if !user.can_log_in() || !verify(body.password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    let tokens = start_session(&services, &user, credential.tenant_id, Utc::now()).await?;
    info!(tenant_id = %credential.tenant_id, user_id = %user.id, "user logged in");
    Ok(ok(tokens))
}

/// Trade a refresh token for a new token pair; the old session ends.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<RefreshRequest>,
) -> ApiResult {
    let now = Utc::now();
    let claims = services
        .validator
        .validate(&body.refresh_token, TokenKind::Refresh, now)?;
    if !services.sessions.is_live(claims.session_id, now).await? {
        return Err(ApiError::unauthenticated("session has ended"));
    }

    let office = &services.backoffice;
    let user = office
        .find(office.stores.users.as_ref(), claims.tenant_id, &claims.sub)
        .await
        .map_err(|_| ApiError::unauthenticated("invalid credentials"))?;
    if !user.can_log_in() {
        return Err(ApiError::unauthenticated("invalid credentials"));
    }

    services.sessions.revoke(claims.session_id).await?;
    let tokens = start_session(&services, &user, claims.tenant_id, now).await?;
    Ok(ok(tokens))
}

pub async fn logout(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    services.sessions.revoke(principal.session_id()).await?;
    Ok(no_content())
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    let office = &services.backoffice;
    let user = office
        .find(
            office.stores.users.as_ref(),
            tenant.tenant_id(),
            &principal.user_id(),
        )
        .await?;
    let account = office.account(tenant.tenant_id()).await?;
    Ok(ok(json!({
        "user": dto::user_to_json(&user),
        "account": dto::account_to_json(&account),
    })))
}

async fn start_session(
    services: &AppServices,
    user: &User,
    tenant_id: TenantId,
    now: DateTime<Utc>,
) -> Result<Value, ApiError> {
    let session_id = Uuid::now_v7();
    let access = services.issuer.issue(
        TokenKind::Access,
        user.id,
        tenant_id,
        user.roles.clone(),
        session_id,
        now,
    )?;
    let refresh = services.issuer.issue(
        TokenKind::Refresh,
        user.id,
        tenant_id,
        user.roles.clone(),
        session_id,
        now,
    )?;
    services
        .sessions
        .create(session_id, refresh.claims.expires_at)
        .await?;

    Ok(json!({
        "access_token": access.token,
        "refresh_token": refresh.token,
        "token_type": "Bearer",
        "expires_in": services.issuer.access_ttl().num_seconds(),
    }))
}

/// Argon2 runs on the blocking pool.
pub(crate) async fn hash(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::from)
}

async fn verify(password: String, phc: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &phc))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}
