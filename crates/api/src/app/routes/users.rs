use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::warn;

use spadesk_auth::user::{AssignRole, CreateUser, DeactivateUser, RevokeRole};
use spadesk_auth::{Permission, Role, User, UserCommand};
use spadesk_core::validation::normalize_email;
use spadesk_core::{DomainError, TenantId, UserId};
use spadesk_infra::credentials::Credential;

use crate::app::dto::{self, CreateUserRequest, ListQuery, RoleChangeRequest, matches_search};
use crate::app::errors::ApiError;
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::auth::hash;
use crate::app::routes::common::{ApiResult, created, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user))
        .route("/:id/roles", post(change_role))
        .route("/:id/deactivate", post(deactivate_user))
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::USERS_MANAGE)?;
    body.validate()?;

    let tenant_id = tenant.tenant_id();
    let user_id = UserId::new();
    let email = normalize_email(&body.email);
    let credentials = &services.backoffice.stores.credentials;
    credentials
        .claim(&email, Credential { tenant_id, user_id })
        .await?;

    match add_user(&services, tenant_id, user_id, email.clone(), body).await {
        Ok(user) => Ok(created(dto::user_to_json(&user))),
        Err(err) => {
            if let Err(release) = credentials.release(&email).await {
                warn!(error = %release, "could not release credential after failed user creation");
            }
            Err(err)
        }
    }
}

async fn add_user(
    services: &AppServices,
    tenant_id: TenantId,
    user_id: UserId,
    email: String,
    body: CreateUserRequest,
) -> Result<User, ApiError> {
    let roles = body.roles();
    let password_hash = hash(body.password).await?;
    let office = &services.backoffice;
    let user = office
        .dispatch(
            office.stores.users.as_ref(),
            tenant_id,
            user_id,
            UserCommand::Create(CreateUser {
                tenant_id,
                user_id,
                email,
                display_name: body.display_name,
                password_hash,
                roles,
                occurred_at: Utc::now(),
            }),
            User::empty,
        )
        .await?;
    Ok(user)
}

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::USERS_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut users: Vec<User> = office
        .list(office.stores.users.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|u| query.active.is_none_or(|a| u.active == a))
        .filter(|u| {
            term.as_deref().is_none_or(|t| {
                matches_search(t, &[Some(u.email.as_str()), Some(u.display_name.as_str())])
            })
        })
        .collect();
    users.sort_by_key(|u| u.id);
    page_of(users, &query, dto::user_to_json)
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::USERS_READ)?;
    let office = &services.backoffice;
    let user = office
        .find(office.stores.users.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::user_to_json(&user)))
}

/// Grant a role, or take it away with `"revoke": true`.
pub async fn change_role(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<UserId>,
    ApiJson(body): ApiJson<RoleChangeRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::USERS_MANAGE)?;
    let role = Role::new(body.role.trim().to_string());
    if !role.is_known() {
        return Err(DomainError::validation(format!("unknown role '{role}'")).into());
    }

    let tenant_id = tenant.tenant_id();
    let occurred_at = Utc::now();
    let command = if body.revoke {
        UserCommand::RevokeRole(RevokeRole {
            tenant_id,
            role,
            occurred_at,
        })
    } else {
        UserCommand::AssignRole(AssignRole {
            tenant_id,
            role,
            actor_roles: principal.roles().to_vec(),
            occurred_at,
        })
    };

    let office = &services.backoffice;
    office
        .find(office.stores.users.as_ref(), tenant_id, &id)
        .await?;
    let user = office
        .dispatch(office.stores.users.as_ref(), tenant_id, id, command, User::empty)
        .await?;
    Ok(ok(dto::user_to_json(&user)))
}

pub async fn deactivate_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<UserId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::USERS_MANAGE)?;
    if id == principal.user_id() {
        return Err(DomainError::validation("you cannot deactivate yourself").into());
    }

    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    office
        .find(office.stores.users.as_ref(), tenant_id, &id)
        .await?;
    let user = office
        .dispatch(
            office.stores.users.as_ref(),
            tenant_id,
            id,
            UserCommand::Deactivate(DeactivateUser {
                tenant_id,
                occurred_at: Utc::now(),
            }),
            User::empty,
        )
        .await?;
    Ok(ok(dto::user_to_json(&user)))
}
