use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use spadesk_accounts::{Account, Outlet, OutletId};
use spadesk_auth::{Role, User};
use spadesk_catalog::{Product, ProductId, Service};
use spadesk_core::validation::Violations;
use spadesk_core::{DomainResult, Money, PageRequest};
use spadesk_invoicing::{Invoice, MAX_LINE_QUANTITY, PricedInvoice};
use spadesk_parties::{ContactInfo, Customer, CustomerId, CustomerPatch, Employee, Vendor, VendorId};
use spadesk_promotions::{Coupon, CouponKind, CouponScope, CouponTerms, DiscountRule, GiftCard};
use spadesk_purchasing::{PurchaseOrder, ReceiptLine};

pub const MIN_PASSWORD_LEN: usize = 8;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub business_name: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub currency: Option<String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.require_non_empty(&self.business_name, "business_name");
        v.require_email(&self.email, "email");
        check_password(&mut v, &self.password);
        v.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub display_name: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl CreateUserRequest {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.require_email(&self.email, "email");
        v.require_non_empty(&self.display_name, "display_name");
        check_password(&mut v, &self.password);
        v.check(!self.roles.is_empty(), "roles must not be empty");
        for role in &self.roles {
            v.check(
                Role::new(role.clone()).is_known(),
                format!("unknown role '{role}'"),
            );
        }
        v.into_result()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.roles.iter().map(|r| Role::new(r.clone())).collect()
    }
}

fn check_password(v: &mut Violations, password: &str) {
    v.check(
        password.chars().count() >= MIN_PASSWORD_LEN,
        format!("password must be at least {MIN_PASSWORD_LEN} characters"),
    );
    v.check(
        password.chars().any(|c| c.is_ascii_alphabetic())
            && password.chars().any(|c| c.is_ascii_digit()),
        "password must contain at least one letter and one number",
    );
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: String,
    #[serde(default)]
    pub revoke: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub business_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOutletRequest {
    pub name: String,
    pub code: String,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOutletRequest {
    pub name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    #[serde(flatten)]
    pub details: CustomerPatch,
    /// Referral code of the customer who referred this one.
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVendorRequest {
    pub name: String,
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVendorRequest {
    pub name: Option<String>,
    pub contact: Option<ContactInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiveStockRequest {
    pub outlet_id: OutletId,
    pub quantity: u32,
    pub unit_cost: Money,
}

impl ReceiveStockRequest {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        check_stock_line(&mut v, self.quantity, self.unit_cost);
        v.into_result()
    }
}

fn check_stock_line(v: &mut Violations, quantity: u32, unit_cost: Money) {
    v.check(
        (1..=MAX_LINE_QUANTITY).contains(&quantity),
        format!("quantity must be between 1 and {MAX_LINE_QUANTITY}"),
    );
    v.check(!unit_cost.is_negative(), "unit_cost must not be negative");
    v.check(
        unit_cost.checked_mul(quantity).is_some(),
        "quantity times unit_cost is too large",
    );
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub outlet_id: OutletId,
    pub delta: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub description: Option<String>,
    pub rule: DiscountRule,
    pub max_discount: Option<Money>,
    #[serde(default)]
    pub min_spend: Money,
    #[serde(default)]
    pub scope: CouponScope,
    /// Defaults to now.
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    pub per_customer_limit: Option<u32>,
}

impl CreateCouponRequest {
    /// API-created coupons are always standard coupons.
    pub fn into_terms(self, now: DateTime<Utc>) -> CouponTerms {
        CouponTerms {
            code: self.code,
            description: self.description,
            kind: CouponKind::Standard,
            rule: self.rule,
            max_discount: self.max_discount,
            min_spend: self.min_spend,
            scope: self.scope,
            valid_from: self.valid_from.unwrap_or(now),
            valid_until: self.valid_until,
            usage_limit: self.usage_limit,
            per_customer_limit: self.per_customer_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponQuery {
    pub code: String,
    pub customer_id: Option<CustomerId>,
    /// Eligible amount to preview the discount for.
    pub amount: Option<Money>,
}

#[derive(Debug, Deserialize)]
pub struct IssueGiftCardRequest {
    /// Generated when omitted.
    pub code: Option<String>,
    pub initial_value: Money,
    pub owner: Option<CustomerId>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Money,
}

#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRewardRequest {
    pub customer_id: CustomerId,
    pub points: u64,
}

#[derive(Debug, Deserialize)]
pub struct VoidInvoiceRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderRequest {
    pub vendor_id: VendorId,
    pub outlet_id: OutletId,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddPurchaseOrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_cost: Money,
}

impl AddPurchaseOrderLineRequest {
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        check_stock_line(&mut v, self.quantity, self.unit_cost);
        v.into_result()
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceivePurchaseOrderRequest {
    pub lines: Vec<ReceiptLine>,
}

/// Query string shared by every list endpoint; each resource reads the
/// filters it supports.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub active: Option<bool>,
    pub customer_id: Option<CustomerId>,
    pub outlet_id: Option<OutletId>,
    pub vendor_id: Option<VendorId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl ListQuery {
    pub fn page_request(&self) -> DomainResult<PageRequest> {
        PageRequest::new(self.page, self.limit)
    }

    /// Lowercased, trimmed search term; `None` when blank.
    pub fn search_term(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
    }
}

/// Case-insensitive substring match over optional fields.
pub fn matches_search(term: &str, fields: &[Option<&str>]) -> bool {
    fields
        .iter()
        .flatten()
        .any(|f| f.to_lowercase().contains(term))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub outlet_id: Option<OutletId>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StockQuery {
    pub outlet_id: Option<OutletId>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn user_to_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "email": user.email,
        "display_name": user.display_name,
        "roles": user.roles,
        "active": user.active,
        "created_at": user.created_at,
    })
}

pub fn account_to_json(account: &Account) -> Value {
    json!({
        "tenant_id": account.tenant_id,
        "business_name": account.profile.business_name,
        "email": account.profile.email,
        "phone": account.profile.phone,
        "currency": account.profile.currency,
        "tax": account.tax,
        "numbering": account.numbering,
        "loyalty": account.loyalty,
        "opened_at": account.opened_at,
    })
}

pub fn outlet_to_json(outlet: &Outlet) -> Value {
    json!({
        "id": outlet.id,
        "name": outlet.name,
        "code": outlet.code,
        "address": outlet.address,
        "phone": outlet.phone,
        "active": outlet.active,
    })
}

pub fn customer_to_json(c: &Customer) -> Value {
    json!({
        "id": c.id,
        "name": c.name,
        "email": c.email,
        "phone": c.phone,
        "gender": c.gender,
        "birthday": c.birthday,
        "anniversary": c.anniversary,
        "notes": c.notes,
        "referral_code": c.referral_code,
        "referred_by": c.referred_by,
        "loyalty_points": c.loyalty_points,
        "wallet_balance": c.wallet_balance,
        "invoice_count": c.invoice_count,
        "lifetime_spend": c.lifetime_spend,
        "active": c.active,
        "registered_at": c.registered_at,
    })
}

pub fn loyalty_to_json(c: &Customer, account: &Account) -> Value {
    let program = &account.loyalty;
    json!({
        "customer_id": c.id,
        "program_enabled": program.enabled,
        "loyalty_points": c.loyalty_points,
        "points_value": program.value_of(c.loyalty_points),
        "min_redeem_points": program.min_redeem_points,
        "wallet_balance": c.wallet_balance,
        "referral_code": c.referral_code,
        "invoice_count": c.invoice_count,
        "lifetime_spend": c.lifetime_spend,
    })
}

pub fn employee_to_json(e: &Employee) -> Value {
    json!({
        "id": e.id,
        "name": e.name,
        "email": e.email,
        "phone": e.phone,
        "designation": e.designation,
        "outlets": e.outlets,
        "commission_rate": e.commission_rate,
        "active": e.active,
    })
}

pub fn vendor_to_json(v: &Vendor) -> Value {
    json!({
        "id": v.id_typed(),
        "name": v.name(),
        "contact": v.contact(),
        "status": v.status(),
    })
}

pub fn service_to_json(s: &Service) -> Value {
    json!({
        "id": s.id,
        "name": s.name,
        "category": s.category,
        "duration_minutes": s.duration_minutes,
        "price": s.price,
        "tax_rate": s.tax_rate,
        "active": s.active,
    })
}

pub fn product_to_json(p: &Product) -> Value {
    json!({
        "id": p.id_typed(),
        "sku": p.sku(),
        "name": p.name(),
        "brand": p.brand(),
        "category": p.category(),
        "price": p.price(),
        "tax_rate": p.tax_rate(),
        "track_inventory": p.track_inventory(),
        "reorder_level": p.reorder_level(),
        "active": p.is_active(),
    })
}

pub fn coupon_to_json(c: &Coupon) -> Value {
    let t = &c.terms;
    json!({
        "id": c.id,
        "code": t.code,
        "description": t.description,
        "kind": t.kind,
        "rule": t.rule,
        "max_discount": t.max_discount,
        "min_spend": t.min_spend,
        "scope": t.scope,
        "valid_from": t.valid_from,
        "valid_until": t.valid_until,
        "usage_limit": t.usage_limit,
        "per_customer_limit": t.per_customer_limit,
        "times_used": c.times_used,
        "active": c.active,
    })
}

pub fn gift_card_to_json(g: &GiftCard) -> Value {
    json!({
        "id": g.id_typed(),
        "code": g.code(),
        "initial_value": g.initial_value(),
        "balance": g.balance(),
        "owner": g.owner(),
        "expires_at": g.expires_at(),
        "active": g.is_active(),
        "redemptions": g.redemptions(),
    })
}

pub fn priced_to_json(p: &PricedInvoice) -> Value {
    json!({
        "lines": p.lines,
        "prices_include_tax": p.prices_include_tax,
        "gross": p.gross,
        "line_discount_total": p.line_discount_total,
        "subtotal": p.subtotal,
        "coupon_code": p.coupon_code,
        "coupon_discount": p.coupon_discount,
        "referral_discount": p.referral_discount,
        "tax_total": p.tax_total,
        "grand_total": p.grand_total,
        "gift_card_applied": p.gift_card_applied,
        "loyalty_points_used": p.loyalty_points_used,
        "loyalty_applied": p.loyalty_applied,
        "cashback_applied": p.cashback_applied,
        "amount_due": p.amount_due,
        "points_earned": p.points_earned,
        "cashback_earned": p.cashback_earned,
    })
}

pub fn invoice_to_json(inv: &Invoice) -> Value {
    json!({
        "id": inv.id_typed(),
        "number": inv.number(),
        "status": inv.status().as_str(),
        "outlet_id": inv.outlet_id(),
        "customer_id": inv.customer_id(),
        "employee_id": inv.employee_id(),
        "pricing": inv.pricing().map(priced_to_json),
        "amount_due": inv.amount_due(),
        "total_paid": inv.total_paid(),
        "outstanding_amount": inv.outstanding_amount(),
        "payments": inv.payments(),
        "stock_allocations": inv.stock_allocations(),
        "notes": inv.notes(),
        "issued_at": inv.issued_at(),
        "void_reason": inv.void_reason(),
        "voided_at": inv.voided_at(),
    })
}

pub fn purchase_order_to_json(po: &PurchaseOrder) -> Value {
    json!({
        "id": po.id_typed(),
        "number": po.number(),
        "vendor_id": po.vendor_id(),
        "outlet_id": po.outlet_id(),
        "status": po.status(),
        "notes": po.notes(),
        "total_cost": po.total_cost().ok(),
        "lines": po.lines().iter().map(|l| json!({
            "line_no": l.line_no,
            "product_id": l.product_id,
            "quantity": l.quantity,
            "unit_cost": l.unit_cost,
            "received": l.received,
            "outstanding": l.outstanding(),
        })).collect::<Vec<_>>(),
        "created_at": po.created_at(),
    })
}
