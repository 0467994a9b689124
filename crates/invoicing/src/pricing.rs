//! Invoice pricing engine.
//!
//! Discounts and tenders stack in a fixed order:
//! line discount, coupon, referral, tax, gift card, loyalty, cashback.
//! Tax is computed per line on what is left after coupon and referral
//! shares; tenders only reduce the amount due and never change tax.
//!
//! Everything here is pure integer arithmetic on minor units.

use serde::{Deserialize, Serialize};

use spadesk_accounts::LoyaltyProgram;
use spadesk_catalog::ItemKind;
use spadesk_core::validation::Violations;
use spadesk_core::{AggregateId, DomainError, DomainResult, Money, Rate};
use spadesk_parties::EmployeeId;
use spadesk_promotions::{Coupon, CouponScope, DiscountRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum LineDiscount {
    Percent(Rate),
    Amount(Money),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingLine {
    pub kind: ItemKind,
    pub item_id: AggregateId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub tax_rate: Rate,
    pub discount: Option<LineDiscount>,
    pub employee_id: Option<EmployeeId>,
}

/// The parts of a coupon the engine needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponOffer {
    pub code: String,
    pub rule: DiscountRule,
    pub max_discount: Option<Money>,
    pub min_spend: Money,
    pub scope: CouponScope,
}

impl From<&Coupon> for CouponOffer {
    fn from(c: &Coupon) -> Self {
        Self {
            code: c.terms.code.clone(),
            rule: c.terms.rule,
            max_discount: c.terms.max_discount,
            min_spend: c.terms.min_spend,
            scope: c.terms.scope,
        }
    }
}

/// A balance-backed tender (gift card or cashback wallet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenderRequest {
    pub available: Money,
    /// Upper bound the caller wants to use; `None` uses as much as possible.
    pub cap: Option<Money>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyRequest {
    pub points: u64,
    pub balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRequest {
    pub lines: Vec<PricingLine>,
    pub prices_include_tax: bool,
    pub coupon: Option<CouponOffer>,
    /// Present only when the customer qualifies for the referral discount.
    pub referral_rate: Option<Rate>,
    pub gift_card: Option<TenderRequest>,
    pub loyalty: Option<LoyaltyRequest>,
    pub cashback: Option<TenderRequest>,
    pub program: LoyaltyProgram,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    pub line_no: u32,
    pub kind: ItemKind,
    pub item_id: AggregateId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub gross: Money,
    pub line_discount: Money,
    pub net: Money,
    pub coupon_share: Money,
    pub referral_share: Money,
    pub taxable: Money,
    pub tax_rate: Rate,
    pub tax: Money,
    pub total: Money,
    pub employee_id: Option<EmployeeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedInvoice {
    pub lines: Vec<PricedLine>,
    pub prices_include_tax: bool,
    pub gross: Money,
    pub line_discount_total: Money,
    pub subtotal: Money,
    pub coupon_code: Option<String>,
    pub coupon_discount: Money,
    pub referral_discount: Money,
    pub tax_total: Money,
    pub grand_total: Money,
    pub gift_card_applied: Money,
    pub loyalty_points_used: u64,
    pub loyalty_applied: Money,
    pub cashback_applied: Money,
    pub amount_due: Money,
    pub points_earned: u64,
    pub cashback_earned: Money,
}

/// Largest quantity a single line may carry.
pub const MAX_LINE_QUANTITY: u32 = 100_000;

fn overflow() -> DomainError {
    DomainError::invariant("amount overflow")
}

fn total(amounts: impl IntoIterator<Item = Money>) -> DomainResult<Money> {
    Money::checked_sum(amounts).ok_or_else(overflow)
}

fn validate(request: &PricingRequest) -> DomainResult<()> {
    let mut v = Violations::new();
    v.check(!request.lines.is_empty(), "at least one line is required");
    for (idx, line) in request.lines.iter().enumerate() {
        let n = idx + 1;
        v.check(line.quantity > 0, format!("line {n}: quantity must be positive"));
        v.check(
            line.quantity <= MAX_LINE_QUANTITY,
            format!("line {n}: quantity must not exceed {MAX_LINE_QUANTITY}"),
        );
        v.check(
            !line.unit_price.is_negative(),
            format!("line {n}: unit_price must not be negative"),
        );
        v.check(
            line.tax_rate <= Rate::HUNDRED_PERCENT,
            format!("line {n}: tax_rate must not exceed 100%"),
        );
        match line.discount {
            Some(LineDiscount::Percent(rate)) => v.check(
                rate <= Rate::HUNDRED_PERCENT,
                format!("line {n}: discount must not exceed 100%"),
            ),
            Some(LineDiscount::Amount(amount)) => v.check(
                !amount.is_negative(),
                format!("line {n}: discount must not be negative"),
            ),
            None => {}
        }
    }
    for (name, tender) in [("gift_card", request.gift_card), ("cashback", request.cashback)] {
        if let Some(t) = tender {
            v.check(
                t.cap.is_none_or(|c| !c.is_negative()),
                format!("{name} amount must not be negative"),
            );
        }
    }
    v.into_result()
}

fn in_scope(scope: CouponScope, kind: ItemKind) -> bool {
    match scope {
        CouponScope::All => true,
        CouponScope::Services => kind == ItemKind::Service,
        CouponScope::Products => kind == ItemKind::Product,
    }
}

fn apply_tender(tender: Option<TenderRequest>, remaining: Money) -> Money {
    let Some(t) = tender else {
        return Money::ZERO;
    };
    let mut applied = t.available.max(Money::ZERO).min(remaining);
    if let Some(cap) = t.cap {
        applied = applied.min(cap);
    }
    applied
}

/// Price an invoice.
///
/// Fails with a validation error for malformed input (including a coupon
/// below its minimum spend or a loyalty request below the program minimum)
/// and with an invariant violation when the customer lacks the points.
pub fn price(request: &PricingRequest) -> DomainResult<PricedInvoice> {
    validate(request)?;

    let mut lines = Vec::with_capacity(request.lines.len());
    for (idx, line) in request.lines.iter().enumerate() {
        let gross = line.unit_price.checked_mul(line.quantity).ok_or_else(overflow)?;
        let discount = match line.discount {
            Some(LineDiscount::Percent(rate)) => gross.apply_rate(rate),
            Some(LineDiscount::Amount(amount)) => amount,
            None => Money::ZERO,
        }
        .min(gross);
        let net = gross - discount;
        lines.push(PricedLine {
            line_no: idx as u32 + 1,
            kind: line.kind,
            item_id: line.item_id,
            name: line.name.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            gross,
            line_discount: discount,
            net,
            coupon_share: Money::ZERO,
            referral_share: Money::ZERO,
            taxable: net,
            tax_rate: line.tax_rate,
            tax: Money::ZERO,
            total: Money::ZERO,
            employee_id: line.employee_id,
        });
    }

    let gross = total(lines.iter().map(|l| l.gross))?;
    let line_discount_total = total(lines.iter().map(|l| l.line_discount))?;
    let subtotal = total(lines.iter().map(|l| l.net))?;

    // Coupon
    let mut coupon_discount = Money::ZERO;
    if let Some(offer) = &request.coupon {
        let weights: Vec<Money> = lines
            .iter()
            .map(|l| if in_scope(offer.scope, l.kind) { l.net } else { Money::ZERO })
            .collect();
        let base = total(weights.iter().copied())?;
        if base < offer.min_spend {
            return Err(DomainError::validation(format!(
                "coupon {} requires a minimum spend of {}",
                offer.code, offer.min_spend
            )));
        }
        let mut discount = offer.rule.discount_on(base);
        if let Some(cap) = offer.max_discount {
            discount = discount.min(cap);
        }
        if discount.is_positive() {
            for (line, share) in lines.iter_mut().zip(discount.split_pro_rata(&weights)) {
                line.coupon_share = share;
                line.taxable = line.taxable - share;
            }
        }
        coupon_discount = discount;
    }

    // Referral
    let mut referral_discount = Money::ZERO;
    if let Some(rate) = request.referral_rate {
        let discount = (subtotal - coupon_discount).apply_rate(rate);
        if discount.is_positive() {
            let weights: Vec<Money> = lines.iter().map(|l| l.taxable).collect();
            for (line, share) in lines.iter_mut().zip(discount.split_pro_rata(&weights)) {
                line.referral_share = share;
                line.taxable = line.taxable - share;
            }
        }
        referral_discount = discount;
    }

    // Tax
    for line in &mut lines {
        if request.prices_include_tax {
            line.tax = line.taxable - line.taxable.exclusive_of(line.tax_rate);
            line.total = line.taxable;
        } else {
            line.tax = line.taxable.apply_rate(line.tax_rate);
            line.total = line.taxable.checked_add(line.tax).ok_or_else(overflow)?;
        }
    }
    let tax_total = total(lines.iter().map(|l| l.tax))?;
    let grand_total = total(lines.iter().map(|l| l.total))?;
    let mut remaining = grand_total;

    // Gift card
    let gift_card_applied = apply_tender(request.gift_card, remaining);
    remaining = remaining - gift_card_applied;

    // Loyalty
    let mut loyalty_points_used = 0;
    let mut loyalty_applied = Money::ZERO;
    if let Some(req) = request.loyalty.filter(|r| r.points > 0) {
        let program = &request.program;
        if !program.enabled {
            return Err(DomainError::validation("loyalty program is not enabled"));
        }
        if req.points < u64::from(program.min_redeem_points) {
            return Err(DomainError::validation(format!(
                "at least {} points must be redeemed",
                program.min_redeem_points
            )));
        }
        if req.points > req.balance {
            return Err(DomainError::invariant(format!(
                "insufficient loyalty points: requested {}, available {}",
                req.points, req.balance
            )));
        }
        let value = program.value_of(req.points).ok_or_else(overflow)?;
        loyalty_applied = value.min(remaining);
        let per_point = program.point_value.minor();
        loyalty_points_used = if per_point > 0 {
            u64::try_from((loyalty_applied.minor() + per_point - 1) / per_point).unwrap_or(0)
        } else {
            0
        };
        remaining = remaining - loyalty_applied;
    }

    // Cashback wallet
    let cashback_applied = apply_tender(request.cashback, remaining);
    remaining = remaining - cashback_applied;

    let amount_due = remaining.max(Money::ZERO);

    Ok(PricedInvoice {
        lines,
        prices_include_tax: request.prices_include_tax,
        gross,
        line_discount_total,
        subtotal,
        coupon_code: request.coupon.as_ref().map(|c| c.code.clone()),
        coupon_discount,
        referral_discount,
        tax_total,
        grand_total,
        gift_card_applied,
        loyalty_points_used,
        loyalty_applied,
        cashback_applied,
        amount_due,
        points_earned: request.program.points_for(amount_due),
        cashback_earned: request.program.cashback_for(amount_due),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn line(kind: ItemKind, unit_price: i64, quantity: u32, tax_bps: u32) -> PricingLine {
        PricingLine {
            kind,
            item_id: AggregateId::new(),
            name: "item".into(),
            quantity,
            unit_price: Money::from_minor(unit_price),
            tax_rate: Rate::from_bps(tax_bps),
            discount: None,
            employee_id: None,
        }
    }

    fn request(lines: Vec<PricingLine>) -> PricingRequest {
        PricingRequest {
            lines,
            prices_include_tax: false,
            coupon: None,
            referral_rate: None,
            gift_card: None,
            loyalty: None,
            cashback: None,
            program: LoyaltyProgram {
                enabled: true,
                ..LoyaltyProgram::default()
            },
        }
    }

    fn m(minor: i64) -> Money {
        Money::from_minor(minor)
    }

    #[test]
    fn exclusive_tax_on_plain_lines() {
        let priced = price(&request(vec![
            line(ItemKind::Service, 10_000, 1, 1800),
            line(ItemKind::Product, 2_500, 2, 1200),
        ]))
        .unwrap();

        assert_eq!(priced.subtotal, m(15_000));
        assert_eq!(priced.tax_total, m(1_800 + 600));
        assert_eq!(priced.grand_total, m(17_400));
        assert_eq!(priced.amount_due, m(17_400));
        assert_eq!(priced.points_earned, 1);
    }

    #[test]
    fn line_totals_that_do_not_fit_are_rejected() {
        // Each line fits on its own; their sum does not.
        let big = i64::MAX / 2 + 1;
        let err = price(&request(vec![
            line(ItemKind::Service, big, 1, 0),
            line(ItemKind::Service, big, 1, 0),
        ]))
        .unwrap_err();
        assert_eq!(err, DomainError::invariant("amount overflow"));
    }

    #[test]
    fn quantity_above_the_line_limit_is_rejected() {
        let err = price(&request(vec![
            line(ItemKind::Service, 2_500_000_000, 2_000_000_000, 0),
            line(ItemKind::Service, 2_500_000_000, 2_000_000_000, 0),
        ]))
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)), "{err:?}");

        let at_limit = price(&request(vec![line(ItemKind::Product, 100, MAX_LINE_QUANTITY, 0)]))
            .unwrap();
        assert_eq!(at_limit.grand_total, m(100 * i64::from(MAX_LINE_QUANTITY)));
    }

    #[test]
    fn inclusive_tax_is_extracted_from_the_total() {
        let mut req = request(vec![line(ItemKind::Service, 11_800, 1, 1800)]);
        req.prices_include_tax = true;
        let priced = price(&req).unwrap();

        assert_eq!(priced.lines[0].tax, m(1_800));
        assert_eq!(priced.grand_total, m(11_800));
    }

    #[test]
    fn line_discount_is_capped_at_gross() {
        let mut l = line(ItemKind::Product, 1_000, 1, 0);
        l.discount = Some(LineDiscount::Amount(m(5_000)));
        let priced = price(&request(vec![l])).unwrap();
        assert_eq!(priced.lines[0].net, Money::ZERO);
        assert_eq!(priced.amount_due, Money::ZERO);
    }

    #[test]
    fn coupon_only_discounts_lines_in_scope() {
        let mut req = request(vec![
            line(ItemKind::Service, 6_000, 1, 0),
            line(ItemKind::Product, 4_000, 1, 0),
        ]);
        req.coupon = Some(CouponOffer {
            code: "SPA10".into(),
            rule: DiscountRule::Percent(Rate::from_bps(1000)),
            max_discount: None,
            min_spend: m(5_000),
            scope: CouponScope::Services,
        });
        let priced = price(&req).unwrap();

        assert_eq!(priced.coupon_discount, m(600));
        assert_eq!(priced.lines[0].coupon_share, m(600));
        assert_eq!(priced.lines[1].coupon_share, Money::ZERO);

        req.lines[0].unit_price = m(4_999);
        assert!(matches!(price(&req), Err(DomainError::Validation(_))));
    }

    #[test]
    fn full_stacking_order() {
        // Subtotal 20000, coupon 2000 flat, referral 10% of 18000 = 1800,
        // taxable 16200, tax 18% = 2916, grand 19116.
        let mut req = request(vec![
            line(ItemKind::Service, 10_000, 1, 1800),
            line(ItemKind::Service, 10_000, 1, 1800),
        ]);
        req.coupon = Some(CouponOffer {
            code: "FLAT20".into(),
            rule: DiscountRule::Flat(m(2_000)),
            max_discount: None,
            min_spend: Money::ZERO,
            scope: CouponScope::All,
        });
        req.referral_rate = Some(Rate::from_bps(1000));
        req.gift_card = Some(TenderRequest {
            available: m(5_000),
            cap: None,
        });
        req.loyalty = Some(LoyaltyRequest {
            points: 120,
            balance: 400,
        });
        req.cashback = Some(TenderRequest {
            available: m(1_000),
            cap: Some(m(116)),
        });
        req.program.cashback_rate = Rate::from_bps(100);

        let priced = price(&req).unwrap();
        assert_eq!(priced.coupon_discount, m(2_000));
        assert_eq!(priced.referral_discount, m(1_800));
        assert_eq!(priced.tax_total, m(2_916));
        assert_eq!(priced.grand_total, m(19_116));
        assert_eq!(priced.gift_card_applied, m(5_000));
        assert_eq!(priced.loyalty_applied, m(12_000));
        assert_eq!(priced.loyalty_points_used, 120);
        assert_eq!(priced.cashback_applied, m(116));
        assert_eq!(priced.amount_due, m(2_000));
        assert_eq!(priced.points_earned, 0);
        assert_eq!(priced.cashback_earned, m(20));
    }

    #[test]
    fn loyalty_uses_only_the_points_it_needs() {
        let mut req = request(vec![line(ItemKind::Product, 1_050, 1, 0)]);
        req.loyalty = Some(LoyaltyRequest {
            points: 100,
            balance: 100,
        });
        let priced = price(&req).unwrap();
        assert_eq!(priced.loyalty_applied, m(1_050));
        assert_eq!(priced.loyalty_points_used, 11);
        assert_eq!(priced.amount_due, Money::ZERO);
    }

    #[test]
    fn loyalty_requests_are_checked() {
        let mut req = request(vec![line(ItemKind::Product, 50_000, 1, 0)]);
        req.loyalty = Some(LoyaltyRequest {
            points: 99,
            balance: 1_000,
        });
        assert!(matches!(price(&req), Err(DomainError::Validation(_))));

        req.loyalty = Some(LoyaltyRequest {
            points: 200,
            balance: 150,
        });
        assert!(matches!(price(&req), Err(DomainError::InvariantViolation(_))));

        req.program.enabled = false;
        assert!(matches!(price(&req), Err(DomainError::Validation(_))));
    }

    #[test]
    fn disabled_program_earns_nothing() {
        let mut req = request(vec![line(ItemKind::Product, 50_000, 1, 0)]);
        req.program.enabled = false;
        req.program.cashback_rate = Rate::from_bps(500);
        let priced = price(&req).unwrap();
        assert_eq!(priced.points_earned, 0);
        assert_eq!(priced.cashback_earned, Money::ZERO);
    }

    #[test]
    fn rejects_empty_and_zero_quantity() {
        assert!(price(&request(vec![])).is_err());
        assert!(price(&request(vec![line(ItemKind::Product, 100, 0, 0)])).is_err());
    }

    proptest! {
        #[test]
        fn totals_reconcile(
            prices in proptest::collection::vec((0i64..50_000, 1u32..5, 0u32..2_800), 1..6),
            coupon_bps in 0u32..10_000,
            referral_bps in 0u32..3_000,
            gift in 0i64..40_000,
            inclusive in any::<bool>(),
        ) {
            let lines = prices
                .iter()
                .map(|(p, q, t)| line(ItemKind::Service, *p, *q, *t))
                .collect();
            let mut req = request(lines);
            req.prices_include_tax = inclusive;
            if coupon_bps > 0 {
                req.coupon = Some(CouponOffer {
                    code: "PROP".into(),
                    rule: DiscountRule::Percent(Rate::from_bps(coupon_bps)),
                    max_discount: None,
                    min_spend: Money::ZERO,
                    scope: CouponScope::All,
                });
            }
            req.referral_rate = Some(Rate::from_bps(referral_bps));
            req.gift_card = Some(TenderRequest { available: m(gift), cap: None });

            let priced = price(&req).unwrap();

            let coupon: Money = priced.lines.iter().map(|l| l.coupon_share).sum();
            let referral: Money = priced.lines.iter().map(|l| l.referral_share).sum();
            prop_assert_eq!(coupon, priced.coupon_discount);
            prop_assert_eq!(referral, priced.referral_discount);
            for l in &priced.lines {
                prop_assert!(!l.taxable.is_negative());
                prop_assert!(!l.tax.is_negative());
            }
            prop_assert_eq!(
                priced.amount_due + priced.gift_card_applied,
                priced.grand_total
            );
            prop_assert!(!priced.amount_due.is_negative());
        }
    }
}
