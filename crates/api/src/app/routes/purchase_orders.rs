use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_auth::Permission;
use spadesk_purchasing::{PurchaseOrder, PurchaseOrderId, PurchaseOrderStatus};

use crate::app::dto::{
    self, AddPurchaseOrderLineRequest, CreatePurchaseOrderRequest, ListQuery, ReasonRequest,
    ReceivePurchaseOrderRequest,
};
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_purchase_order).get(list_purchase_orders))
        .route("/:id", get(get_purchase_order))
        .route("/:id/lines", post(add_line))
        .route("/:id/submit", post(submit))
        .route("/:id/receive", post(receive))
        .route("/:id/cancel", post(cancel))
}

pub async fn create_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreatePurchaseOrderRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::PURCHASING_MANAGE)?;
    let order = services
        .backoffice
        .create_purchase_order(
            tenant.tenant_id(),
            body.vendor_id,
            body.outlet_id,
            body.notes,
            Utc::now(),
        )
        .await?;
    Ok(created(dto::purchase_order_to_json(&order)))
}

pub async fn list_purchase_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::PURCHASING_READ)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<PurchaseOrderStatus>)
        .transpose()?;

    let office = &services.backoffice;
    let mut orders: Vec<PurchaseOrder> = office
        .list(office.stores.purchase_orders.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|po| status.is_none_or(|s| po.status() == s))
        .filter(|po| query.vendor_id.is_none_or(|v| po.vendor_id() == Some(v)))
        .filter(|po| query.outlet_id.is_none_or(|o| po.outlet_id() == Some(o)))
        .filter(|po| {
            let created = po.created_at();
            query.from.is_none_or(|from| created.is_some_and(|c| c >= from))
                && query.to.is_none_or(|to| created.is_some_and(|c| c < to))
        })
        .collect();
    orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
    page_of(orders, &query, dto::purchase_order_to_json)
}

pub async fn get_purchase_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<PurchaseOrderId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::PURCHASING_READ)?;
    let office = &services.backoffice;
    let order = office
        .find(office.stores.purchase_orders.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::purchase_order_to_json(&order)))
}

pub async fn add_line(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<PurchaseOrderId>,
    ApiJson(body): ApiJson<AddPurchaseOrderLineRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::PURCHASING_MANAGE)?;
    body.validate()?;
    let order = services
        .backoffice
        .add_purchase_order_line(
            tenant.tenant_id(),
            id,
            body.product_id,
            body.quantity,
            body.unit_cost,
            Utc::now(),
        )
        .await?;
    Ok(ok(dto::purchase_order_to_json(&order)))
}

pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<PurchaseOrderId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::PURCHASING_MANAGE)?;
    let order = services
        .backoffice
        .submit_purchase_order(tenant.tenant_id(), id, Utc::now())
        .await?;
    Ok(ok(dto::purchase_order_to_json(&order)))
}

/// Book received quantities; each becomes a stock batch at the line cost.
pub async fn receive(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<PurchaseOrderId>,
    ApiJson(body): ApiJson<ReceivePurchaseOrderRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::PURCHASING_MANAGE)?;
    let order = services
        .backoffice
        .receive_purchase_order(tenant.tenant_id(), id, body.lines, Utc::now())
        .await?;
    Ok(ok(dto::purchase_order_to_json(&order)))
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<PurchaseOrderId>,
    body: Option<ApiJson<ReasonRequest>>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::PURCHASING_MANAGE)?;
    let reason = body.and_then(|ApiJson(b)| b.reason);
    let order = services
        .backoffice
        .cancel_purchase_order(tenant.tenant_id(), id, reason, Utc::now())
        .await?;
    Ok(ok(dto::purchase_order_to_json(&order)))
}
