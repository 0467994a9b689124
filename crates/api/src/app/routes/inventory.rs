use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use spadesk_auth::Permission;
use spadesk_catalog::ProductId;

use crate::app::dto::{AdjustStockRequest, ReceiveStockRequest, StockQuery};
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, ok};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/low-stock", get(low_stock))
        .route("/:product_id", get(stock_level))
        .route("/:product_id/receive", post(receive_stock))
        .route("/:product_id/adjust", post(adjust_stock))
}

/// Tracked products at or below their reorder level.
pub async fn low_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<StockQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVENTORY_READ)?;
    let items = services
        .backoffice
        .low_stock(tenant.tenant_id(), query.outlet_id)
        .await?;
    Ok(ok(json!({ "items": items })))
}

pub async fn stock_level(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiQuery(query): ApiQuery<StockQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVENTORY_READ)?;
    let level = services
        .backoffice
        .stock_level(tenant.tenant_id(), product_id, query.outlet_id)
        .await?;
    Ok(ok(json!(level)))
}

/// Manual receipt outside a purchase order.
pub async fn receive_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<ReceiveStockRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVENTORY_MANAGE)?;
    body.validate()?;
    let level = services
        .backoffice
        .receive_stock(
            tenant.tenant_id(),
            product_id,
            body.outlet_id,
            body.quantity,
            body.unit_cost,
            Utc::now(),
        )
        .await?;
    Ok(ok(json!(level)))
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(product_id): ApiPath<ProductId>,
    ApiJson(body): ApiJson<AdjustStockRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVENTORY_MANAGE)?;
    let level = services
        .backoffice
        .adjust_stock(
            tenant.tenant_id(),
            product_id,
            body.outlet_id,
            body.delta,
            body.reason,
            Utc::now(),
        )
        .await?;
    Ok(ok(json!(level)))
}
