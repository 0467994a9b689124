use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, put},
    Router,
};
use chrono::Utc;

use spadesk_accounts::{Account, AccountCommand, LoyaltyProgram, NumberingPolicy, TaxSettings};
use spadesk_auth::Permission;
use spadesk_core::AggregateId;

use crate::app::dto::{self, UpdateProfileRequest};
use crate::app::extract::ApiJson;
use crate::app::routes::common::{ApiResult, ok};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", get(get_account).patch(update_profile))
        .route("/tax", put(update_tax))
        .route("/numbering", put(update_numbering))
        .route("/loyalty", put(update_loyalty))
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::ACCOUNT_READ)?;
    let account = services.backoffice.account(tenant.tenant_id()).await?;
    Ok(ok(dto::account_to_json(&account)))
}

pub async fn update_profile(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<UpdateProfileRequest>,
) -> ApiResult {
    let tenant_id = tenant.tenant_id();
    execute(
        &services,
        &tenant,
        &principal,
        AccountCommand::UpdateProfile {
            tenant_id,
            business_name: body.business_name,
            email: body.email,
            phone: body.phone,
            currency: body.currency,
            occurred_at: Utc::now(),
        },
    )
    .await
}

pub async fn update_tax(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(tax): ApiJson<TaxSettings>,
) -> ApiResult {
    let tenant_id = tenant.tenant_id();
    let command = AccountCommand::UpdateTaxSettings {
        tenant_id,
        tax,
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, command).await
}

pub async fn update_numbering(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(numbering): ApiJson<NumberingPolicy>,
) -> ApiResult {
    let tenant_id = tenant.tenant_id();
    let command = AccountCommand::UpdateNumbering {
        tenant_id,
        numbering,
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, command).await
}

pub async fn update_loyalty(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(loyalty): ApiJson<LoyaltyProgram>,
) -> ApiResult {
    let tenant_id = tenant.tenant_id();
    let command = AccountCommand::UpdateLoyaltyProgram {
        tenant_id,
        loyalty,
        occurred_at: Utc::now(),
    };
    execute(&services, &tenant, &principal, command).await
}

async fn execute(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    command: AccountCommand,
) -> ApiResult {
    authz::require(tenant, principal, &Permission::ACCOUNT_MANAGE)?;
    let office = &services.backoffice;
    let tenant_id = tenant.tenant_id();
    let account = office
        .dispatch(
            office.stores.accounts.as_ref(),
            tenant_id,
            AggregateId::from(tenant_id),
            command,
            Account::empty,
        )
        .await?;
    Ok(ok(dto::account_to_json(&account)))
}
