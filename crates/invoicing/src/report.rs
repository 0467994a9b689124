//! Sales reports over issued invoices.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_accounts::OutletId;
use spadesk_catalog::ItemKind;
use spadesk_core::{AggregateId, Money};
use spadesk_parties::{Employee, EmployeeId};

use crate::invoice::{Invoice, InvoiceStatus, PaymentMode};

/// Half-open issue-time window `[from, to)` plus an optional outlet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub outlet_id: Option<OutletId>,
}

impl ReportFilter {
    pub fn matches(&self, invoice: &Invoice) -> bool {
        let Some(issued_at) = invoice.issued_at() else {
            return false;
        };
        self.from.is_none_or(|from| issued_at >= from)
            && self.to.is_none_or(|to| issued_at < to)
            && self.outlet_id.is_none_or(|o| invoice.outlet_id() == Some(o))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub invoice_count: u32,
    pub void_count: u32,
    pub gross: Money,
    pub line_discounts: Money,
    pub coupon_discounts: Money,
    pub referral_discounts: Money,
    pub tax: Money,
    pub grand_total: Money,
    pub gift_card: Money,
    pub loyalty: Money,
    pub cashback: Money,
    pub amount_due: Money,
    pub collected: Money,
    pub collected_by_mode: BTreeMap<PaymentMode, Money>,
}

/// Totals of non-void invoices matching `filter`; voids are only counted.
pub fn sales_summary<'a>(invoices: impl IntoIterator<Item = &'a Invoice>, filter: &ReportFilter) -> SalesSummary {
    let mut s = SalesSummary::default();
    for invoice in invoices.into_iter().filter(|i| filter.matches(i)) {
        if invoice.status() == InvoiceStatus::Void {
            s.void_count += 1;
            continue;
        }
        let Some(p) = invoice.pricing() else { continue };
        s.invoice_count += 1;
        s.gross += p.gross;
        s.line_discounts += p.line_discount_total;
        s.coupon_discounts += p.coupon_discount;
        s.referral_discounts += p.referral_discount;
        s.tax += p.tax_total;
        s.grand_total += p.grand_total;
        s.gift_card += p.gift_card_applied;
        s.loyalty += p.loyalty_applied;
        s.cashback += p.cashback_applied;
        s.amount_due += p.amount_due;
        for payment in invoice.payments() {
            s.collected += payment.amount;
            *s.collected_by_mode.entry(payment.mode).or_default() += payment.amount;
        }
    }
    s
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopItem {
    pub kind: ItemKind,
    pub item_id: AggregateId,
    pub name: String,
    pub quantity: u64,
    /// Net of discounts, before tax.
    pub revenue: Money,
}

/// Best-selling items by revenue, highest first; ties break on quantity.
pub fn top_items<'a>(
    invoices: impl IntoIterator<Item = &'a Invoice>,
    filter: &ReportFilter,
    limit: usize,
) -> Vec<TopItem> {
    let mut by_item: HashMap<AggregateId, TopItem> = HashMap::new();
    for invoice in invoices
        .into_iter()
        .filter(|i| filter.matches(i) && i.status() != InvoiceStatus::Void)
    {
        let Some(p) = invoice.pricing() else { continue };
        for line in &p.lines {
            let entry = by_item.entry(line.item_id).or_insert_with(|| TopItem {
                kind: line.kind,
                item_id: line.item_id,
                name: line.name.clone(),
                quantity: 0,
                revenue: Money::ZERO,
            });
            entry.quantity += u64::from(line.quantity);
            entry.revenue += line.taxable;
        }
    }

    let mut items: Vec<TopItem> = by_item.into_values().collect();
    items.sort_by(|a, b| {
        b.revenue
            .cmp(&a.revenue)
            .then(b.quantity.cmp(&a.quantity))
            .then(a.name.cmp(&b.name))
    });
    items.truncate(limit);
    items
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeePerformance {
    pub employee_id: EmployeeId,
    pub name: String,
    pub services: u64,
    pub service_revenue: Money,
    pub commission: Money,
}

/// Service revenue per employee with commission at the employee's rate.
///
/// A line's own employee wins over the invoice-level employee. Employees
/// without sales are omitted.
pub fn employee_performance<'a>(
    invoices: impl IntoIterator<Item = &'a Invoice>,
    employees: &[Employee],
    filter: &ReportFilter,
) -> Vec<EmployeePerformance> {
    let mut revenue: HashMap<EmployeeId, (u64, Money)> = HashMap::new();
    for invoice in invoices
        .into_iter()
        .filter(|i| filter.matches(i) && i.status() != InvoiceStatus::Void)
    {
        let Some(p) = invoice.pricing() else { continue };
        for line in p.lines.iter().filter(|l| l.kind == ItemKind::Service) {
            if let Some(employee) = line.employee_id.or(invoice.employee_id()) {
                let entry = revenue.entry(employee).or_insert((0, Money::ZERO));
                entry.0 += u64::from(line.quantity);
                entry.1 += line.taxable;
            }
        }
    }

    let mut rows: Vec<EmployeePerformance> = employees
        .iter()
        .filter_map(|e| {
            let (services, service_revenue) = revenue.get(&e.id).copied()?;
            Some(EmployeePerformance {
                employee_id: e.id,
                name: e.name.clone(),
                services,
                service_revenue,
                commission: service_revenue.apply_rate(e.commission_rate),
            })
        })
        .collect();
    rows.sort_by(|a, b| b.service_revenue.cmp(&a.service_revenue));
    rows
}
