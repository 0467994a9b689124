use std::sync::Arc;

use axum::{extract::Extension, routing::post, Router};
use chrono::Utc;

use spadesk_auth::Permission;

use crate::app::dto::{self, RedeemRewardRequest};
use crate::app::extract::ApiJson;
use crate::app::routes::common::{ApiResult, created};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/redeem", post(redeem))
}

/// Convert loyalty points into a single-use rewards coupon.
pub async fn redeem(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<RedeemRewardRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::REWARDS_REDEEM)?;
    let coupon = services
        .backoffice
        .redeem_reward(tenant.tenant_id(), body.customer_id, body.points, Utc::now())
        .await?;
    Ok(created(dto::coupon_to_json(&coupon)))
}
