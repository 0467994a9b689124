use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_accounts::{Outlet, OutletCommand, OutletId};
use spadesk_auth::Permission;
use spadesk_infra::{KeyKind, UniqueKey};

use crate::app::dto::{self, CreateOutletRequest, ListQuery, UpdateOutletRequest, matches_search};
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_outlet).get(list_outlets))
        .route("/:id", get(get_outlet).patch(update_outlet))
        .route("/:id/deactivate", post(deactivate_outlet))
        .route("/:id/activate", post(activate_outlet))
}

pub async fn create_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateOutletRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::OUTLETS_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;

    let outlet_id = OutletId::generate();
    let code = body.code.trim().to_ascii_uppercase();
    let key = UniqueKey::new(KeyKind::OutletCode, code.clone());

    let outlet = office
        .with_unique_keys(tenant_id, outlet_id, &[], &[key], || {
            office.dispatch(
                office.stores.outlets.as_ref(),
                tenant_id,
                outlet_id,
                OutletCommand::Create {
                    tenant_id,
                    name: body.name,
                    code,
                    address: body.address,
                    phone: body.phone,
                    occurred_at: Utc::now(),
                },
                Outlet::empty,
            )
        })
        .await?;
    Ok(created(dto::outlet_to_json(&outlet)))
}

pub async fn list_outlets(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::OUTLETS_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut outlets: Vec<Outlet> = office
        .list(office.stores.outlets.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|o| query.active.is_none_or(|a| o.active == a))
        .filter(|o| {
            term.as_deref()
                .is_none_or(|t| matches_search(t, &[Some(o.name.as_str()), Some(o.code.as_str())]))
        })
        .collect();
    outlets.sort_by(|a, b| a.code.cmp(&b.code));
    page_of(outlets, &query, dto::outlet_to_json)
}

pub async fn get_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<OutletId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::OUTLETS_READ)?;
    let office = &services.backoffice;
    let outlet = office
        .find(office.stores.outlets.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::outlet_to_json(&outlet)))
}

pub async fn update_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<OutletId>,
    ApiJson(body): ApiJson<UpdateOutletRequest>,
) -> ApiResult {
    let tenant_id = tenant.tenant_id();
    let command = OutletCommand::Update {
        tenant_id,
        name: body.name,
        address: body.address,
        phone: body.phone,
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, id, command).await
}

pub async fn deactivate_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<OutletId>,
) -> ApiResult {
    let command = OutletCommand::Deactivate {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, id, command).await
}

pub async fn activate_outlet(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<OutletId>,
) -> ApiResult {
    let command = OutletCommand::Activate {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, id, command).await
}

async fn execute(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    id: OutletId,
    command: OutletCommand,
) -> ApiResult {
    authz::require(tenant, principal, &Permission::OUTLETS_MANAGE)?;
    let office = &services.backoffice;
    office
        .find(office.stores.outlets.as_ref(), tenant.tenant_id(), &id)
        .await?;
    let outlet = office
        .dispatch(
            office.stores.outlets.as_ref(),
            tenant.tenant_id(),
            id,
            command,
            Outlet::empty,
        )
        .await?;
    Ok(ok(dto::outlet_to_json(&outlet)))
}
