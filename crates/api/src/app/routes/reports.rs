//! Read-only sales reports over the tenant's invoices.

use std::sync::Arc;

use axum::{extract::Extension, routing::get, Router};
use serde_json::json;

use spadesk_auth::Permission;
use spadesk_infra::TenantStore;
use spadesk_invoicing::{Invoice, ReportFilter, employee_performance, sales_summary, top_items};

use crate::app::dto::ReportQuery;
use crate::app::errors::ApiError;
use crate::app::extract::ApiQuery;
use crate::app::routes::common::{ApiResult, ok};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const DEFAULT_TOP_ITEMS: usize = 10;
const MAX_TOP_ITEMS: usize = 100;

pub fn router() -> Router {
    Router::new()
        .route("/sales", get(sales))
        .route("/top-items", get(top_selling))
        .route("/employees", get(employees))
}

pub async fn sales(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::REPORTS_READ)?;
    let filter = filter_of(&query);
    let invoices = invoices(&services, &tenant).await?;
    let summary = sales_summary(&invoices, &filter);
    Ok(ok(json!({ "filter": filter, "summary": summary })))
}

pub async fn top_selling(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::REPORTS_READ)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TOP_ITEMS)
        .clamp(1, MAX_TOP_ITEMS);
    let filter = filter_of(&query);
    let invoices = invoices(&services, &tenant).await?;
    let items = top_items(&invoices, &filter, limit);
    Ok(ok(json!({ "filter": filter, "items": items })))
}

pub async fn employees(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ReportQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::REPORTS_READ)?;
    let filter = filter_of(&query);
    // Deleted employees keep their historic sales.
    let staff = services
        .backoffice
        .stores
        .employees
        .list(tenant.tenant_id())
        .await
        .map_err(ApiError::from)?;
    let invoices = invoices(&services, &tenant).await?;
    let rows = employee_performance(&invoices, &staff, &filter);
    Ok(ok(json!({ "filter": filter, "employees": rows })))
}

fn filter_of(query: &ReportQuery) -> ReportFilter {
    ReportFilter {
        from: query.from,
        to: query.to,
        outlet_id: query.outlet_id,
    }
}

async fn invoices(services: &AppServices, tenant: &TenantContext) -> Result<Vec<Invoice>, ApiError> {
    let office = &services.backoffice;
    Ok(office
        .list(office.stores.invoices.as_ref(), tenant.tenant_id())
        .await?)
}
