use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;

use spadesk_auth::Permission;
use spadesk_core::{Money, TenantId};
use spadesk_infra::{KeyKind, UniqueKey};
use spadesk_promotions::{Coupon, CouponCommand, CouponId, CouponPatch, normalize_code};

use crate::app::dto::{self, CreateCouponRequest, ListQuery, ValidateCouponQuery, matches_search};
use crate::app::errors::ApiError;
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_coupon).get(list_coupons))
        .route("/validate", get(validate_coupon))
        .route(
            "/:id",
            get(get_coupon).patch(update_coupon).delete(delete_coupon),
        )
        .route("/:id/deactivate", post(deactivate_coupon))
}

pub async fn create_coupon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateCouponRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::COUPONS_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let now = Utc::now();
    let office = &services.backoffice;

    let coupon_id = CouponId::generate();
    let key = UniqueKey::new(KeyKind::CouponCode, normalize_code(&body.code));

    let coupon = office
        .with_unique_keys(tenant_id, coupon_id, &[], &[key], || {
            office.dispatch(
                office.stores.coupons.as_ref(),
                tenant_id,
                coupon_id,
                CouponCommand::Create {
                    tenant_id,
                    terms: body.into_terms(now),
                    occurred_at: now,
                },
                Coupon::empty,
            )
        })
        .await?;
    Ok(created(dto::coupon_to_json(&coupon)))
}

pub async fn list_coupons(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::COUPONS_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut coupons: Vec<Coupon> = office
        .list(office.stores.coupons.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|c| query.active.is_none_or(|a| c.active == a))
        .filter(|c| {
            query
                .customer_id
                .is_none_or(|id| c.terms.kind.bound_customer() == Some(id))
        })
        .filter(|c| {
            term.as_deref().is_none_or(|t| {
                matches_search(t, &[Some(c.code()), c.terms.description.as_deref()])
            })
        })
        .collect();
    coupons.sort_by(|a, b| b.id.cmp(&a.id));
    page_of(coupons, &query, dto::coupon_to_json)
}

/// Check a code at the counter and preview its discount.
pub async fn validate_coupon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ValidateCouponQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::COUPONS_READ)?;
    let coupon = services
        .backoffice
        .coupon_by_code(tenant.tenant_id(), &query.code)
        .await?;
    coupon.check_applicable(Utc::now(), query.customer_id)?;

    let discount = query.amount.map(|amount| {
        if amount < coupon.terms.min_spend {
            Money::ZERO
        } else {
            coupon.discount_for(amount)
        }
    });
    Ok(ok(json!({
        "valid": true,
        "coupon": dto::coupon_to_json(&coupon),
        "discount": discount,
    })))
}

pub async fn get_coupon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CouponId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::COUPONS_READ)?;
    let coupon = find(&services, tenant.tenant_id(), id).await?;
    Ok(ok(dto::coupon_to_json(&coupon)))
}

pub async fn update_coupon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CouponId>,
    ApiJson(patch): ApiJson<CouponPatch>,
) -> ApiResult {
    let command = CouponCommand::Update {
        tenant_id: tenant.tenant_id(),
        patch,
        occurred_at: Utc::now(),
    };
    let coupon = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::coupon_to_json(&coupon)))
}

pub async fn deactivate_coupon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CouponId>,
) -> ApiResult {
    let command = CouponCommand::Deactivate {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    let coupon = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::coupon_to_json(&coupon)))
}

pub async fn delete_coupon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CouponId>,
) -> ApiResult {
    let command = CouponCommand::Delete {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, id, command).await?;
    Ok(no_content())
}

async fn find(services: &AppServices, tenant_id: TenantId, id: CouponId) -> Result<Coupon, ApiError> {
    let office = &services.backoffice;
    Ok(office
        .find(office.stores.coupons.as_ref(), tenant_id, &id)
        .await?)
}

async fn execute(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    id: CouponId,
    command: CouponCommand,
) -> Result<Coupon, ApiError> {
    authz::require(tenant, principal, &Permission::COUPONS_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let current = find(services, tenant_id, id).await?;
    let deleting = matches!(command, CouponCommand::Delete { .. });
    let office = &services.backoffice;
    let coupon = office
        .dispatch(office.stores.coupons.as_ref(), tenant_id, id, command, Coupon::empty)
        .await?;
    if deleting {
        let key = UniqueKey::new(KeyKind::CouponCode, current.code());
        office.release_unique_keys(tenant_id, id, &[key]).await;
    }
    Ok(coupon)
}
