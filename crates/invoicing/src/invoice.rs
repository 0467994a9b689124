use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_accounts::OutletId;
use spadesk_catalog::ProductId;
use spadesk_core::{Aggregate, AggregateRoot, DomainError, Money, TenantId, ensure_tenant};
use spadesk_events::Event;
use spadesk_parties::{CustomerId, EmployeeId};
use spadesk_promotions::{CouponId, GiftCardId};

use crate::pricing::PricedInvoice;

spadesk_core::typed_id!(
    /// Invoice identifier (tenant-scoped via `tenant_id` fields in events/commands).
    InvoiceId,
    "invoice id"
);

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Void => "void",
        }
    }

    fn from_amounts(paid: Money, due: Money) -> Self {
        if paid >= due {
            InvoiceStatus::Paid
        } else if paid.is_zero() {
            InvoiceStatus::Unpaid
        } else {
            InvoiceStatus::PartiallyPaid
        }
    }
}

impl core::str::FromStr for InvoiceStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(InvoiceStatus::Unpaid),
            "partially_paid" => Ok(InvoiceStatus::PartiallyPaid),
            "paid" => Ok(InvoiceStatus::Paid),
            "void" => Ok(InvoiceStatus::Void),
            other => Err(DomainError::validation(format!("unknown invoice status '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Cash,
    Card,
    Upi,
    Wallet,
    Other,
}

impl PaymentMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMode::Cash => "cash",
            PaymentMode::Card => "card",
            PaymentMode::Upi => "upi",
            PaymentMode::Wallet => "wallet",
            PaymentMode::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    pub amount: Money,
    pub mode: PaymentMode,
    pub reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Money,
    pub mode: PaymentMode,
    pub reference: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Stock consumed by one tracked product line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAllocationRef {
    pub product_id: ProductId,
    pub reference: String,
    pub quantity: u32,
    pub cost: Money,
}

/// Aggregate root: Invoice.
///
/// Totals are frozen at issue time; afterwards only payments and the void
/// flag change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    id: InvoiceId,
    tenant_id: Option<TenantId>,
    number: String,
    outlet_id: Option<OutletId>,
    customer_id: Option<CustomerId>,
    employee_id: Option<EmployeeId>,
    status: InvoiceStatus,
    pricing: Option<PricedInvoice>,
    coupon_id: Option<CouponId>,
    gift_card_id: Option<GiftCardId>,
    stock_allocations: Vec<StockAllocationRef>,
    payments: Vec<Payment>,
    total_paid: Money,
    notes: Option<String>,
    issued_at: Option<DateTime<Utc>>,
    void_reason: Option<String>,
    voided_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            outlet_id: None,
            customer_id: None,
            employee_id: None,
            status: InvoiceStatus::Unpaid,
            pricing: None,
            coupon_id: None,
            gift_card_id: None,
            stock_allocations: Vec::new(),
            payments: Vec::new(),
            total_paid: Money::ZERO,
            notes: None,
            issued_at: None,
            void_reason: None,
            voided_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn number(&self) -> &str {
        &self.number
    }

    pub fn outlet_id(&self) -> Option<OutletId> {
        self.outlet_id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn employee_id(&self) -> Option<EmployeeId> {
        self.employee_id
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn pricing(&self) -> Option<&PricedInvoice> {
        self.pricing.as_ref()
    }

    pub fn coupon_id(&self) -> Option<CouponId> {
        self.coupon_id
    }

    pub fn gift_card_id(&self) -> Option<GiftCardId> {
        self.gift_card_id
    }

    pub fn stock_allocations(&self) -> &[StockAllocationRef] {
        &self.stock_allocations
    }

    pub fn payments(&self) -> &[Payment] {
        &self.payments
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn void_reason(&self) -> Option<&str> {
        self.void_reason.as_deref()
    }

    pub fn voided_at(&self) -> Option<DateTime<Utc>> {
        self.voided_at
    }

    pub fn amount_due(&self) -> Money {
        self.pricing.as_ref().map(|p| p.amount_due).unwrap_or(Money::ZERO)
    }

    pub fn total_paid(&self) -> Money {
        self.total_paid
    }

    pub fn outstanding_amount(&self) -> Money {
        self.amount_due().saturating_sub_floor(self.total_paid)
    }

    /// Invariant: cannot pay void invoice.
    pub fn can_accept_payment(&self) -> bool {
        self.status != InvoiceStatus::Void && self.outstanding_amount().is_positive()
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: IssueInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub outlet_id: OutletId,
    pub customer_id: Option<CustomerId>,
    pub employee_id: Option<EmployeeId>,
    pub pricing: PricedInvoice,
    pub coupon_id: Option<CouponId>,
    pub gift_card_id: Option<GiftCardId>,
    pub stock_allocations: Vec<StockAllocationRef>,
    pub payments: Vec<PaymentInput>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RegisterPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterPayment {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: PaymentInput,
    pub occurred_at: DateTime<Utc>,
}

/// Command: VoidInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidInvoice {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    IssueInvoice(Box<IssueInvoice>),
    RegisterPayment(RegisterPayment),
    VoidInvoice(VoidInvoice),
}

/// Event: InvoiceIssued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceIssued {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub number: String,
    pub outlet_id: OutletId,
    pub customer_id: Option<CustomerId>,
    pub employee_id: Option<EmployeeId>,
    pub pricing: PricedInvoice,
    pub coupon_id: Option<CouponId>,
    pub gift_card_id: Option<GiftCardId>,
    pub stock_allocations: Vec<StockAllocationRef>,
    pub payments: Vec<Payment>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRegistered {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub payment: Payment,
    pub new_total_paid: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceVoided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceVoided {
    pub tenant_id: TenantId,
    pub invoice_id: InvoiceId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceIssued(Box<InvoiceIssued>),
    PaymentRegistered(PaymentRegistered),
    InvoiceVoided(InvoiceVoided),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceIssued(_) => "invoicing.invoice.issued",
            InvoiceEvent::PaymentRegistered(_) => "invoicing.invoice.payment_registered",
            InvoiceEvent::InvoiceVoided(_) => "invoicing.invoice.voided",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceIssued(e) => e.occurred_at,
            InvoiceEvent::PaymentRegistered(e) => e.occurred_at,
            InvoiceEvent::InvoiceVoided(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceIssued(e) => {
                self.id = e.invoice_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.outlet_id = Some(e.outlet_id);
                self.customer_id = e.customer_id;
                self.employee_id = e.employee_id;
                self.pricing = Some(e.pricing.clone());
                self.coupon_id = e.coupon_id;
                self.gift_card_id = e.gift_card_id;
                self.stock_allocations = e.stock_allocations.clone();
                self.payments = e.payments.clone();
                self.total_paid = e.payments.iter().map(|p| p.amount).sum();
                self.notes = e.notes.clone();
                self.issued_at = Some(e.occurred_at);
                self.status = InvoiceStatus::from_amounts(self.total_paid, e.pricing.amount_due);
                self.created = true;
            }
            InvoiceEvent::PaymentRegistered(e) => {
                self.payments.push(e.payment.clone());
                self.total_paid = e.new_total_paid;
                self.status = InvoiceStatus::from_amounts(self.total_paid, self.amount_due());
            }
            InvoiceEvent::InvoiceVoided(e) => {
                self.status = InvoiceStatus::Void;
                self.void_reason = Some(e.reason.clone());
                self.voided_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::IssueInvoice(cmd) => self.handle_issue(cmd),
            InvoiceCommand::RegisterPayment(cmd) => self.handle_register_payment(cmd),
            InvoiceCommand::VoidInvoice(cmd) => self.handle_void(cmd),
        }
    }
}

impl Invoice {
    fn ensure_invoice_id(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_issue(&self, cmd: &IssueInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        if cmd.pricing.lines.is_empty() {
            return Err(DomainError::validation("cannot issue invoice without lines"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("invoice number is required"));
        }

        let mut paid = Money::ZERO;
        for p in &cmd.payments {
            p.amount.ensure_positive("payment amount")?;
            paid = paid
                .checked_add(p.amount)
                .ok_or_else(|| DomainError::invariant("payment total overflow"))?;
        }
        if paid > cmd.pricing.amount_due {
            return Err(DomainError::invariant("cannot overpay invoice"));
        }

        Ok(vec![InvoiceEvent::InvoiceIssued(Box::new(InvoiceIssued {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            number: cmd.number.clone(),
            outlet_id: cmd.outlet_id,
            customer_id: cmd.customer_id,
            employee_id: cmd.employee_id,
            pricing: cmd.pricing.clone(),
            coupon_id: cmd.coupon_id,
            gift_card_id: cmd.gift_card_id,
            stock_allocations: cmd.stock_allocations.clone(),
            payments: cmd
                .payments
                .iter()
                .map(|p| Payment {
                    amount: p.amount,
                    mode: p.mode,
                    reference: p.reference.clone(),
                    paid_at: cmd.occurred_at,
                })
                .collect(),
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        }))])
    }

    fn handle_register_payment(
        &self,
        cmd: &RegisterPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        ensure_tenant(self.tenant_id, cmd.tenant_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.can_accept_payment() {
            return Err(DomainError::invariant(
                "cannot register payment on void or fully paid invoice",
            ));
        }

        cmd.payment.amount.ensure_positive("payment amount")?;

        let new_total_paid = self
            .total_paid
            .checked_add(cmd.payment.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;

        if new_total_paid > self.amount_due() {
            return Err(DomainError::invariant("cannot overpay invoice"));
        }

        Ok(vec![InvoiceEvent::PaymentRegistered(PaymentRegistered {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            payment: Payment {
                amount: cmd.payment.amount,
                mode: cmd.payment.mode,
                reference: cmd.payment.reference.clone(),
                paid_at: cmd.occurred_at,
            },
            new_total_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_void(&self, cmd: &VoidInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        ensure_tenant(self.tenant_id, cmd.tenant_id)?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.status == InvoiceStatus::Void {
            return Err(DomainError::conflict("invoice is already void"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("void reason is required"));
        }

        Ok(vec![InvoiceEvent::InvoiceVoided(InvoiceVoided {
            tenant_id: cmd.tenant_id,
            invoice_id: cmd.invoice_id,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pricing::{PricingLine, PricingRequest, price};
    use spadesk_accounts::LoyaltyProgram;
    use spadesk_catalog::ItemKind;
    use spadesk_core::{AggregateId, Rate};

    pub(crate) fn priced(unit_price: i64) -> PricedInvoice {
        price(&PricingRequest {
            lines: vec![PricingLine {
                kind: ItemKind::Service,
                item_id: AggregateId::new(),
                name: "Facial".into(),
                quantity: 2,
                unit_price: Money::from_minor(unit_price),
                tax_rate: Rate::ZERO,
                discount: None,
                employee_id: None,
            }],
            prices_include_tax: false,
            coupon: None,
            referral_rate: None,
            gift_card: None,
            loyalty: None,
            cashback: None,
            program: LoyaltyProgram::default(),
        })
        .unwrap()
    }

    fn issue_cmd(tenant_id: TenantId, invoice_id: InvoiceId, pricing: PricedInvoice) -> IssueInvoice {
        IssueInvoice {
            tenant_id,
            invoice_id,
            number: "INV-MAIN-2026-00001".into(),
            outlet_id: OutletId::generate(),
            customer_id: None,
            employee_id: None,
            pricing,
            coupon_id: None,
            gift_card_id: None,
            stock_allocations: vec![],
            payments: vec![],
            notes: None,
            occurred_at: Utc::now(),
        }
    }

    fn issued(unit_price: i64) -> (Invoice, TenantId) {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::generate();
        let mut invoice = Invoice::empty(invoice_id);
        let events = invoice
            .handle(&InvoiceCommand::IssueInvoice(Box::new(issue_cmd(
                tenant_id,
                invoice_id,
                priced(unit_price),
            ))))
            .unwrap();
        invoice.apply(&events[0]);
        (invoice, tenant_id)
    }

    fn pay(invoice: &Invoice, tenant_id: TenantId, amount: i64) -> Result<Vec<InvoiceEvent>, DomainError> {
        invoice.handle(&InvoiceCommand::RegisterPayment(RegisterPayment {
            tenant_id,
            invoice_id: invoice.id_typed(),
            payment: PaymentInput {
                amount: Money::from_minor(amount),
                mode: PaymentMode::Cash,
                reference: None,
            },
            occurred_at: Utc::now(),
        }))
    }

    #[test]
    fn issue_invoice_emits_invoice_issued_event() {
        let (invoice, _) = issued(100);
        assert_eq!(invoice.amount_due(), Money::from_minor(200));
        assert_eq!(invoice.status(), InvoiceStatus::Unpaid);
        assert_eq!(invoice.number(), "INV-MAIN-2026-00001");
        assert_eq!(invoice.version(), 1);
    }

    #[test]
    fn zero_amount_due_is_paid_on_issue() {
        let (invoice, _) = issued(0);
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
    }

    #[test]
    fn initial_payments_cannot_exceed_amount_due() {
        let tenant_id = TenantId::new();
        let invoice_id = InvoiceId::generate();
        let mut cmd = issue_cmd(tenant_id, invoice_id, priced(100));
        cmd.payments = vec![PaymentInput {
            amount: Money::from_minor(201),
            mode: PaymentMode::Card,
            reference: None,
        }];
        let err = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::IssueInvoice(Box::new(cmd)))
            .unwrap_err();
        assert_eq!(err, DomainError::invariant("cannot overpay invoice"));
    }

    #[test]
    fn cannot_pay_void_invoice() {
        let (mut invoice, tenant_id) = issued(100);

        let events = invoice
            .handle(&InvoiceCommand::VoidInvoice(VoidInvoice {
                tenant_id,
                invoice_id: invoice.id_typed(),
                reason: "Customer dispute".to_string(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.status(), InvoiceStatus::Void);

        let err = pay(&invoice, tenant_id, 50).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg)
                if msg.contains("cannot register payment on void or fully paid invoice") => {}
            _ => panic!("Expected InvariantViolation for paying void invoice"),
        }
    }

    #[test]
    fn cannot_overpay_invoice() {
        let (invoice, tenant_id) = issued(100);
        let err = pay(&invoice, tenant_id, 201).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("cannot overpay invoice") => {}
            _ => panic!("Expected InvariantViolation for overpaying invoice"),
        }
    }

    #[test]
    fn paying_to_total_marks_invoice_paid() {
        let (mut invoice, tenant_id) = issued(100);

        let events = pay(&invoice, tenant_id, 50).unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.total_paid(), Money::from_minor(50));
        assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);

        let events = pay(&invoice, tenant_id, 150).unwrap();
        invoice.apply(&events[0]);
        assert_eq!(invoice.total_paid(), Money::from_minor(200));
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.payments().len(), 2);
    }

    #[test]
    fn another_tenant_cannot_pay() {
        let (invoice, _) = issued(100);
        assert!(pay(&invoice, TenantId::new(), 10).is_err());
    }

    #[test]
    fn status_parses_from_query_strings() {
        assert_eq!("partially_paid".parse::<InvoiceStatus>().unwrap(), InvoiceStatus::PartiallyPaid);
        assert!("open".parse::<InvoiceStatus>().is_err());
    }
}
