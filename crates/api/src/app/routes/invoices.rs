use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tracing::info;

use spadesk_auth::Permission;
use spadesk_infra::CheckoutRequest;
use spadesk_invoicing::{Invoice, InvoiceId, InvoiceStatus, PaymentInput, ReportFilter};

use crate::app::dto::{self, ListQuery, VoidInvoiceRequest};
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/quote", post(quote_invoice))
        .route("/", post(create_invoice).get(list_invoices))
        .route("/:id", get(get_invoice))
        .route("/:id/payments", post(register_payment))
        .route("/:id/void", post(void_invoice))
}

/// Price a basket without side effects.
pub async fn quote_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVOICES_CREATE)?;
    let priced = services
        .backoffice
        .quote(tenant.tenant_id(), &body, Utc::now())
        .await?;
    Ok(ok(dto::priced_to_json(&priced)))
}

pub async fn create_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVOICES_CREATE)?;
    let invoice = services
        .backoffice
        .create_invoice(tenant.tenant_id(), body, Utc::now())
        .await?;
    info!(
        tenant_id = %tenant.tenant_id(),
        user_id = %principal.user_id(),
        number = invoice.number(),
        "invoice created"
    );
    Ok(created(dto::invoice_to_json(&invoice)))
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVOICES_READ)?;
    let status = query
        .status
        .as_deref()
        .map(str::parse::<InvoiceStatus>)
        .transpose()?;
    let window = ReportFilter {
        from: query.from,
        to: query.to,
        outlet_id: query.outlet_id,
    };
    let term = query.search_term();

    let office = &services.backoffice;
    let mut invoices: Vec<Invoice> = office
        .list(office.stores.invoices.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|i| window.matches(i))
        .filter(|i| status.is_none_or(|s| i.status() == s))
        .filter(|i| query.customer_id.is_none_or(|c| i.customer_id() == Some(c)))
        .filter(|i| {
            term.as_deref()
                .is_none_or(|t| i.number().to_lowercase().contains(t))
        })
        .collect();
    invoices.sort_by(|a, b| b.issued_at().cmp(&a.issued_at()));
    page_of(invoices, &query, dto::invoice_to_json)
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<InvoiceId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVOICES_READ)?;
    let office = &services.backoffice;
    let invoice = office
        .find(office.stores.invoices.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::invoice_to_json(&invoice)))
}

pub async fn register_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<InvoiceId>,
    ApiJson(payment): ApiJson<PaymentInput>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVOICES_PAY)?;
    let invoice = services
        .backoffice
        .register_payment(tenant.tenant_id(), id, payment, Utc::now())
        .await?;
    Ok(ok(dto::invoice_to_json(&invoice)))
}

/// Void and undo the invoice's side effects.
pub async fn void_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<InvoiceId>,
    ApiJson(body): ApiJson<VoidInvoiceRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::INVOICES_VOID)?;
    let invoice = services
        .backoffice
        .void_invoice(tenant.tenant_id(), id, body.reason, Utc::now())
        .await?;
    info!(
        tenant_id = %tenant.tenant_id(),
        user_id = %principal.user_id(),
        number = invoice.number(),
        "invoice voided"
    );
    Ok(ok(dto::invoice_to_json(&invoice)))
}
