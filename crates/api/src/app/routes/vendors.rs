use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_auth::Permission;
use spadesk_parties::vendor::{RegisterVendor, SuspendVendor, UpdateDetails};
use spadesk_parties::{Vendor, VendorCommand, VendorId};

use crate::app::dto::{
    self, CreateVendorRequest, ListQuery, ReasonRequest, UpdateVendorRequest, matches_search,
};
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_vendor).get(list_vendors))
        .route("/:id", get(get_vendor).patch(update_vendor))
        .route("/:id/suspend", post(suspend_vendor))
}

pub async fn register_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateVendorRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::VENDORS_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let vendor_id = VendorId::generate();
    let command = VendorCommand::Register(RegisterVendor {
        tenant_id,
        vendor_id,
        name: body.name,
        contact: body.contact,
        occurred_at: Utc::now(),
    });

    let office = &services.backoffice;
    let vendor = office
        .dispatch(
            office.stores.vendors.as_ref(),
            tenant_id,
            vendor_id,
            command,
            Vendor::empty,
        )
        .await?;
    Ok(created(dto::vendor_to_json(&vendor)))
}

pub async fn list_vendors(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::VENDORS_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut vendors: Vec<Vendor> = office
        .list(office.stores.vendors.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|v| query.active.is_none_or(|a| v.can_transact() == a))
        .filter(|v| {
            term.as_deref().is_none_or(|t| {
                let contact = v.contact();
                matches_search(
                    t,
                    &[
                        Some(v.name()),
                        contact.contact_person.as_deref(),
                        contact.email.as_deref(),
                        contact.phone.as_deref(),
                    ],
                )
            })
        })
        .collect();
    vendors.sort_by(|a, b| a.name().cmp(b.name()));
    page_of(vendors, &query, dto::vendor_to_json)
}

pub async fn get_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<VendorId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::VENDORS_READ)?;
    let office = &services.backoffice;
    let vendor = office
        .find(office.stores.vendors.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::vendor_to_json(&vendor)))
}

pub async fn update_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<VendorId>,
    ApiJson(body): ApiJson<UpdateVendorRequest>,
) -> ApiResult {
    let command = VendorCommand::UpdateDetails(UpdateDetails {
        tenant_id: tenant.tenant_id(),
        name: body.name,
        contact: body.contact,
        occurred_at: Utc::now(),
    });
    execute(&services, &tenant, &principal, id, command).await
}

pub async fn suspend_vendor(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<VendorId>,
    body: Option<ApiJson<ReasonRequest>>,
) -> ApiResult {
    let body = body.map(|ApiJson(b)| b).unwrap_or_default();
    let command = VendorCommand::Suspend(SuspendVendor {
        tenant_id: tenant.tenant_id(),
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    execute(&services, &tenant, &principal, id, command).await
}

async fn execute(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    id: VendorId,
    command: VendorCommand,
) -> ApiResult {
    authz::require(tenant, principal, &Permission::VENDORS_MANAGE)?;
    let office = &services.backoffice;
    office
        .find(office.stores.vendors.as_ref(), tenant.tenant_id(), &id)
        .await?;
    let vendor = office
        .dispatch(
            office.stores.vendors.as_ref(),
            tenant.tenant_id(),
            id,
            command,
            Vendor::empty,
        )
        .await?;
    Ok(ok(dto::vendor_to_json(&vendor)))
}
