use std::sync::Arc;

use axum::{extract::Extension, routing::post, Router};
use chrono::Utc;
use serde_json::json;

use spadesk_auth::Permission;

use crate::app::routes::common::{ApiResult, ok};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new().route("/run", post(run_jobs))
}

/// Run today's scheduled jobs for the caller's tenant now.
pub async fn run_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::ACCOUNT_MANAGE)?;
    let report = services
        .backoffice
        .run_all(tenant.tenant_id(), Utc::now())
        .await?;
    Ok(ok(json!(report)))
}
