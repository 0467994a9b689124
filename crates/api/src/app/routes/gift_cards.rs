use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use chrono::Utc;

use spadesk_auth::Permission;
use spadesk_infra::{KeyKind, UniqueKey};
use spadesk_promotions::{GiftCard, GiftCardCommand, GiftCardId, normalize_code};

use crate::app::dto::{self, AmountRequest, CodeQuery, IssueGiftCardRequest, ListQuery};
use crate::app::errors::ApiError;
use crate::app::extract::{ApiJson, ApiPath, ApiQuery};
use crate::app::routes::common::{ApiResult, created, ok, page_of};
use crate::app::services::AppServices;
use crate::authz;
use crate::context::{PrincipalContext, TenantContext};

const GENERATED_CODE_PREFIX: &str = "GC";
const GENERATED_CODE_LEN: usize = 16;

pub fn router() -> Router {
    Router::new()
        .route("/", post(issue_gift_card).get(list_gift_cards))
        .route("/lookup", get(lookup_gift_card))
        .route("/:id", get(get_gift_card))
        .route("/:id/top-up", post(top_up_gift_card))
        .route("/:id/deactivate", post(deactivate_gift_card))
}

pub async fn issue_gift_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<IssueGiftCardRequest>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::GIFT_CARDS_ISSUE)?;
    let tenant_id = tenant.tenant_id();
    let office = &services.backoffice;

    if let Some(owner) = body.owner {
        office
            .find(office.stores.customers.as_ref(), tenant_id, &owner)
            .await?;
    }

    let card_id = GiftCardId::generate();
    let key = match body.code.as_deref().map(normalize_code) {
        Some(code) if !code.is_empty() => UniqueKey::new(KeyKind::GiftCardCode, code),
        _ => {
            office
                .claim_generated_code(
                    tenant_id,
                    KeyKind::GiftCardCode,
                    card_id,
                    GENERATED_CODE_PREFIX,
                    GENERATED_CODE_LEN,
                )
                .await?
        }
    };

    let now = Utc::now();
    let code = key.value.clone();
    let card = office
        .with_unique_keys(tenant_id, card_id, &[], &[key], || {
            office.dispatch(
                office.stores.gift_cards.as_ref(),
                tenant_id,
                card_id,
                GiftCardCommand::Issue {
                    tenant_id,
                    code,
                    initial_value: body.initial_value,
                    owner: body.owner,
                    expires_at: body.expires_at,
                    occurred_at: now,
                },
                GiftCard::empty,
            )
        })
        .await?;
    Ok(created(dto::gift_card_to_json(&card)))
}

pub async fn list_gift_cards(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::GIFT_CARDS_READ)?;
    let office = &services.backoffice;
    let term = query.search_term();
    let mut cards: Vec<GiftCard> = office
        .list(office.stores.gift_cards.as_ref(), tenant.tenant_id())
        .await?
        .into_iter()
        .filter(|g| query.active.is_none_or(|a| g.is_active() == a))
        .filter(|g| query.customer_id.is_none_or(|c| g.owner() == Some(c)))
        .filter(|g| {
            term.as_deref()
                .is_none_or(|t| g.code().to_lowercase().contains(t))
        })
        .collect();
    cards.sort_by(|a, b| b.id_typed().cmp(&a.id_typed()));
    page_of(cards, &query, dto::gift_card_to_json)
}

/// Balance check by code, as done at the counter.
pub async fn lookup_gift_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiQuery(query): ApiQuery<CodeQuery>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::GIFT_CARDS_READ)?;
    let card = services
        .backoffice
        .gift_card_by_code(tenant.tenant_id(), &query.code)
        .await?;
    let mut view = dto::gift_card_to_json(&card);
    view["usable"] = card.ensure_usable(Utc::now()).is_ok().into();
    Ok(ok(view))
}

pub async fn get_gift_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<GiftCardId>,
) -> ApiResult {
    authz::require(&tenant, &principal, &Permission::GIFT_CARDS_READ)?;
    let office = &services.backoffice;
    let card = office
        .find(office.stores.gift_cards.as_ref(), tenant.tenant_id(), &id)
        .await?;
    Ok(ok(dto::gift_card_to_json(&card)))
}

pub async fn top_up_gift_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<GiftCardId>,
    ApiJson(body): ApiJson<AmountRequest>,
) -> ApiResult {
    let command = GiftCardCommand::TopUp {
        tenant_id: tenant.tenant_id(),
        amount: body.amount,
        occurred_at: Utc::now(),
    };
    let card = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::gift_card_to_json(&card)))
}

pub async fn deactivate_gift_card(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    ApiPath(id): ApiPath<GiftCardId>,
) -> ApiResult {
    let command = GiftCardCommand::Deactivate {
        tenant_id: tenant.tenant_id(),
        occurred_at: Utc::now(),
    };
    let card = execute(&services, &tenant, &principal, id, command).await?;
    Ok(ok(dto::gift_card_to_json(&card)))
}

async fn execute(
    services: &AppServices,
    tenant: &TenantContext,
    principal: &PrincipalContext,
    id: GiftCardId,
    command: GiftCardCommand,
) -> Result<GiftCard, ApiError> {
    authz::require(tenant, principal, &Permission::GIFT_CARDS_MANAGE)?;
    let office = &services.backoffice;
    office
        .find(office.stores.gift_cards.as_ref(), tenant.tenant_id(), &id)
        .await?;
    let card = office
        .dispatch(
            office.stores.gift_cards.as_ref(),
            tenant.tenant_id(),
            id,
            command,
            GiftCard::empty,
        )
        .await?;
    Ok(card)
}
