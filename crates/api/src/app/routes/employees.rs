use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_auth::Permission;
use spadesk_parties::{Employee, EmployeeCommand, EmployeeId, EmployeePatch};

use crate::app::dto::{self, ListQuery, matches_search};
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, no_content, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_employee).get(list_employees))
        .route(
            "/:id",
            get(get_employee)
                .patch(update_employee)
                .delete(delete_employee),
        )
}

pub async fn create_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(details): ApiJson<EmployeePatch>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::EMPLOYEES_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    for outlet in details.outlets.iter().flatten() {
        office
            .find(office.stores.outlets.as_ref(), tenant_id, outlet)
            .await?;
    }

    let employee = office
        .dispatch(
            office.stores.employees.as_ref(),
            tenant_id,
            EmployeeId::generate(),
            EmployeeCommand::Register {
                tenant_id,
                details,
                occurred_at: Utc::now(),
            },
            Employee::empty,
        )
        .await?;
    Ok(created(dto::employee_to_json(&employee)))
}

pub async fn list_employees(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::EMPLOYEES_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut employees: Vec<Employee> = office
        .list(office.stores.employees.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|e| query.active.is_none_or(|a| e.active == a))
        .filter(|e| query.outlet_id.is_none_or(|o| e.outlets.contains(&o)))
        .filter(|e| {
            term.as_deref().is_none_or(|t| {
                matches_search(
                    t,
                    &[
                        Some(e.name.as_str()),
                        e.email.as_deref(),
                        e.phone.as_deref(),
                        e.designation.as_deref(),
                    ],
                )
            })
        })
        .collect();
    employees.sort_by(|a, b| a.name.cmp(&b.name));
    page_of(employees, &query, dto::employee_to_json)
}

pub async fn get_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<EmployeeId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::EMPLOYEES_READ)?;
    let office = &services.backoffice;
    let employee = office
        .find(office.stores.employees.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::employee_to_json(&employee)))
}

pub async fn update_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<EmployeeId>,
    ApiJson(patch): ApiJson<EmployeePatch>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::EMPLOYEES_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    office
        .find(office.stores.employees.as_ref(), tenant_id, &id)
        .await?;
    for outlet in patch.outlets.iter().flatten() {
        office
            .find(office.stores.outlets.as_ref(), tenant_id, outlet)
            .await?;
    }

    let employee = office
        .dispatch(
            office.stores.employees.as_ref(),
            tenant_id,
            id,
            EmployeeCommand::Update {
                tenant_id,
                patch,
                occurred_at: Utc::now(),
            },
            Employee::empty,
        )
        .await?;
    Ok(ok(dto::employee_to_json(&employee)))
}

pub async fn delete_employee(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<EmployeeId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::EMPLOYEES_MANAGE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;
    office
        .find(office.stores.employees.as_ref(), tenant_id, &id)
        .await?;
    office
        .dispatch(
            office.stores.employees.as_ref(),
            tenant_id,
            id,
            EmployeeCommand::Delete {
                tenant_id,
                occurred_at: Utc::now(),
            },
            Employee::empty,
        )
        .await?;
    Ok(no_content())
}
