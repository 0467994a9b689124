use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_auth::Permission;
use spadesk_catalog::{Service, ServiceCommand, ServiceId, ServicePatch};

use crate::app::dto::{self, ListQuery, matches_search};
use crate::app::errors::ApiError;
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_service).get(list_services))
        .route(
            "/:id",
            get(get_service).patch(update_service).delete(delete_service),
        )
        .route("/:id/deactivate", post(deactivate_service))
        .route("/:id/activate", post(activate_service))
}

pub async fn create_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(details): ApiJson<ServicePatch>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CATALOG_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    let service = office
        .dispatch(
            office.stores.services.as_ref(),
            tenant_id,
            ServiceId::generate(),
            ServiceCommand::Create {
                tenant_id,
                details,
                occurred_at: Utc::now(),
            },
            Service::empty,
        )
        .await?;
    Ok(created(dto::service_to_json(&service)))
}

pub async fn list_services(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CATALOG_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut items: Vec<Service> = office
        .list(office.stores.services.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|s| query.active.is_none_or(|a| s.active == a))
        .filter(|s| {
            term.as_deref()
                .is_none_or(|t| matches_search(t, &[Some(s.name.as_str()), s.category.as_deref()]))
        })
        .collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));
    page_of(items, &query, dto::service_to_json)
}

pub async fn get_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ServiceId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CATALOG_READ)?;
    let office = &services.backoffice;
    let service = office
        .find(office.stores.services.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::service_to_json(&service)))
}

pub async fn update_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ServiceId>,
    ApiJson(patch): ApiJson<ServicePatch>,
) -> ApiResult {
    let command = ServiceCommand::Update {
        tenant_id: tenant.tenant_id(),
        patch,
        occurred_at: Utc::now(),
    };
    let service = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::service_to_json(&service)))
}

pub async fn delete_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ServiceId>,
) -> ApiResult {
    let command = ServiceCommand::Delete {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, id, command).await?;
    Ok(no_content())
}

pub async fn deactivate_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ServiceId>,
) -> ApiResult {
    let command = ServiceCommand::Deactivate {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    let service = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::service_to_json(&service)))
}

pub async fn activate_service(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ServiceId>,
) -> ApiResult {
    let command = ServiceCommand::Activate {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    let service = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::service_to_json(&service)))
}

async fn execute(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    id: ServiceId,
    command: ServiceCommand,
) -> Result<Service, ApiError> {
    authz::require(tenant, principal, &Permission::CATALOG_MANAGE)?;
    let office = &services.backoffice;
    office
        .find(office.stores.services.as_ref(), tenant.tenant_id(), &id)
        .await?;
    let service = office
        .dispatch(
            office.stores.services.as_ref(),
            tenant.tenant_id(),
            id,
            command,
            Service::empty,
        )
        .await?;
    Ok(service)
}
