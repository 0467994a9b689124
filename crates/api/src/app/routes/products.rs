use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_auth::Permission;
use spadesk_catalog::product::{CreateProduct, ProductLifecycle, UpdateProduct, normalize_sku};
use spadesk_catalog::{Product, ProductCommand, ProductId, ProductPatch};
use spadesk_infra::{KeyKind, UniqueKey};

use crate::app::dto::{self, ListQuery, matches_search};
use crate::app::errors::ApiError;
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_product).get(list_products))
        .route(
            "/:id",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .route("/:id/deactivate", post(deactivate_product))
        .route("/:id/activate", post(activate_product))
}

pub async fn create_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(details): ApiJson<ProductPatch>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CATALOG_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let product_id = ProductId::generate();
    let keys = details.sku.as_deref().map(sku_key).unwrap_or_default();
    let command = ProductCommand::CreateProduct(CreateProduct {
        tenant_id,
        product_id,
        details,
        occurred_at: Utc::now(),
    });
    let office = &services.backoffice;
    let product = office
        .with_unique_keys(tenant_id, product_id, &[], &keys, || {
            office.dispatch(
                office.stores.products.as_ref(),
                tenant_id,
                product_id,
                command,
                Product::empty,
            )
        })
        .await?;
    Ok(created(dto::product_to_json(&product)))
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CATALOG_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut products: Vec<Product> = office
        .list(office.stores.products.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|p| query.active.is_none_or(|a| p.is_active() == a))
        .filter(|p| {
            term.as_deref().is_none_or(|t| {
                matches_search(t, &[Some(p.sku()), Some(p.name()), p.brand(), p.category()])
            })
        })
        .collect();
    products.sort_by(|a, b| a.sku().cmp(b.sku()));
    page_of(products, &query, dto::product_to_json)
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ProductId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CATALOG_READ)?;
    let office = &services.backoffice;
    let product = office
        .find(office.stores.products.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::product_to_json(&product)))
}

pub async fn update_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> ApiResult {
    let command = ProductCommand::UpdateProduct(UpdateProduct {
        tenant_id: tenant.tenant_id(),
        patch,
        occurred_at: Utc::now(),
    });
    let product = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::product_to_json(&product)))
}

pub async fn delete_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ProductId>,
) -> ApiResult {
    let command = ProductCommand::DeleteProduct(lifecycle(&tenant));
    execute(&services, &tenant, &principal, id, command).await?;
    Ok(no_content())
}

pub async fn deactivate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ProductId>,
) -> ApiResult {
    let command = ProductCommand::DeactivateProduct(lifecycle(&tenant));
    let product = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::product_to_json(&product)))
}

pub async fn activate_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<ProductId>,
) -> ApiResult {
    let command = ProductCommand::ActivateProduct(lifecycle(&tenant));
    let product = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::product_to_json(&product)))
}

fn lifecycle(tenant: &TenantContext) -> ProductLifecycle {
    ProductLifecycle {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    }
}

/// SKUs are unique per tenant, compared after normalization.
fn sku_key(sku: &str) -> Vec<UniqueKey> {
    let sku = normalize_sku(sku);
    if sku.is_empty() {
        return Vec::new();
    }
    vec![UniqueKey::new(KeyKind::Sku, sku)]
}

async fn execute(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    id: ProductId,
    command: ProductCommand,
) -> Result<Product, ApiError> {
    authz::require(tenant, principal, &Permission::CATALOG_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    let current = office
        .find(office.stores.products.as_ref(), tenant_id, &id)
        .await?;

    let held = sku_key(current.sku());
    let wanted = match &command {
        ProductCommand::UpdateProduct(update) => match update.patch.sku.as_deref() {
            Some(sku) => sku_key(sku),
            None => held.clone(),
        },
        ProductCommand::DeleteProduct(_) => Vec::new(),
        _ => held.clone(),
    };
    let product = office
        .with_unique_keys(tenant_id, id, &held, &wanted, || {
            office.dispatch(
                office.stores.products.as_ref(),
                tenant_id,
                id,
                command,
                Product::empty,
            )
        })
        .await?;
    Ok(product)
}
