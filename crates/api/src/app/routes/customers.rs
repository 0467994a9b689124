use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_auth::Permission;
use spadesk_core::validation::normalize_email;
use spadesk_core::{DomainError, TenantId};
use spadesk_infra::{DispatchError, KeyKind, UniqueKey};
use spadesk_parties::customer::RegisterCustomer;
use spadesk_parties::{Customer, CustomerCommand, CustomerId, CustomerPatch};

use crate::app::dto::{self, CreateCustomerRequest, ListQuery, matches_search};
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const REFERRAL_CODE_LEN: usize = 8;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_customer).get(list_customers))
        .route(
            "/:id",
            get(get_customer)
                .patch(update_customer)
                .delete(delete_customer),
        )
        .route("/:id/loyalty", get(customer_loyalty))
}

pub async fn create_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<CreateCustomerRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CUSTOMERS_CREATE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;

    let referred_by = match body.referral_code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => {
            let code = code.to_ascii_uppercase();
            let referrer = office
                .list(office.stores.customers.as_ref(), tenant_id)
                .await?
                .into_iter()
                .find(|c| c.referral_code == code)
                .ok_or_else(|| DomainError::validation("referral_code does not match any customer"))?;
            Some(referrer.id)
        }
        _ => None,
    };

    let customer_id = CustomerId::generate();
    let referral = office
        .claim_generated_code(
            tenant_id,
            KeyKind::ReferralCode,
            customer_id,
            "",
            REFERRAL_CODE_LEN,
        )
        .await?;
    let mut keys = contact_keys(body.details.email.as_deref(), body.details.phone.as_deref());
    keys.push(referral.clone());

    let customer = office
        .with_unique_keys(tenant_id, customer_id, &[], &keys, || {
            office.dispatch(
                office.stores.customers.as_ref(),
                tenant_id,
                customer_id,
                CustomerCommand::Register(RegisterCustomer {
                    tenant_id,
                    details: body.details,
                    referral_code: referral.value,
                    referred_by,
                    occurred_at: Utc::now(),
                }),
                Customer::empty,
            )
        })
        .await?;
    Ok(created(dto::customer_to_json(&customer)))
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CUSTOMERS_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut customers: Vec<Customer> = office
        .list(office.stores.customers.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|c| query.active.is_none_or(|a| c.active == a))
        .filter(|c| {
            term.as_deref().is_none_or(|t| {
                matches_search(
                    t,
                    &[
                        Some(c.name.as_str()),
                        c.email.as_deref(),
                        c.phone.as_deref(),
                        Some(c.referral_code.as_str()),
                    ],
                )
            })
        })
        .collect();
    // Newest first.
    customers.sort_by(|a, b| b.id.cmp(&a.id));
    page_of(customers, &query, dto::customer_to_json)
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CustomerId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CUSTOMERS_READ)?;
    let customer = find(&services, tenant.tenant_id(), id).await?;
    Ok(ok(dto::customer_to_json(&customer)))
}

pub async fn update_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CustomerId>,
    ApiJson(patch): ApiJson<CustomerPatch>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CUSTOMERS_UPDATE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    let current = find(&services, tenant_id, id).await?;

    let held = contact_keys(current.email.as_deref(), current.phone.as_deref());
    let wanted = contact_keys(
        patched(&patch.email, &current.email),
        patched(&patch.phone, &current.phone),
    );
    let customer = office
        .with_unique_keys(tenant_id, id, &held, &wanted, || {
            office.dispatch(
                office.stores.customers.as_ref(),
                tenant_id,
                id,
                CustomerCommand::UpdateDetails {
                    tenant_id,
                    patch,
                    occurred_at: Utc::now(),
                },
                Customer::empty,
            )
        })
        .await?;
    Ok(ok(dto::customer_to_json(&customer)))
}

pub async fn delete_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CustomerId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CUSTOMERS_DELETE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    let current = find(&services, tenant_id, id).await?;
    office
        .dispatch(
            office.stores.customers.as_ref(),
            tenant_id,
            id,
            CustomerCommand::Delete {
                tenant_id,
                occurred_at: Utc::now(),
            },
            Customer::empty,
        )
        .await?;
    let mut keys = contact_keys(current.email.as_deref(), current.phone.as_deref());
    keys.push(UniqueKey::new(KeyKind::ReferralCode, current.referral_code));
    office.release_unique_keys(tenant_id, id, &keys).await;
    Ok(no_content())
}

/// Points, their redeemable value and wallet balance.
pub async fn customer_loyalty(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<CustomerId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::CUSTOMERS_READ)?;
    let customer = find(&services, tenant.tenant_id(), id).await?;
    let account = services.backoffice.account(tenant.tenant_id()).await?;
    Ok(ok(dto::loyalty_to_json(&customer, &account)))
}

async fn find(
    services: &AppServices,
    tenant_id: TenantId,
    id: CustomerId,
) -> Result<Customer, DispatchError> {
    let office = &services.backoffice;
    office
        .find(office.stores.customers.as_ref(), tenant_id, &id)
        .await
}

/// E-mail and phone identify a customer within the tenant.
fn contact_keys(email: Option<&str>, phone: Option<&str>) -> Vec<UniqueKey> {
    let mut keys = Vec::new();
    if let Some(email) = email.map(normalize_email).filter(|e| !e.is_empty()) {
        keys.push(UniqueKey::new(KeyKind::CustomerEmail, email));
    }
    if let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) {
        keys.push(UniqueKey::new(KeyKind::CustomerPhone, phone));
    }
    keys
}

/// A patched field; an empty value clears it.
fn patched<'a>(value: &'a Option<String>, current: &'a Option<String>) -> Option<&'a str> {
    match value {
        Some(v) => Some(v.as_str()),
        None => current.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_keys_are_normalized() {
        let keys = contact_keys(Some(" Asha@Spa.test "), Some(" 98450 12345 "));
        assert_eq!(
            keys,
            vec![
                UniqueKey::new(KeyKind::CustomerEmail, "asha@spa.test"),
                UniqueKey::new(KeyKind::CustomerPhone, "98450 12345"),
            ]
        );
        assert!(contact_keys(Some("  "), None).is_empty());
    }

    #[test]
    fn cleared_contacts_drop_their_keys() {
        let current = Some("asha@spa.test".to_string());
        assert_eq!(patched(&None, &current), Some("asha@spa.test"));
        let cleared = Some(String::new());
        assert!(contact_keys(patched(&cleared, &current), None).is_empty());
    }
}
