//! Checkout workflow: quote, issue, pay and void invoices.
//!
//! Issuing touches several aggregates (stock ledgers, coupon, gift card,
//! customer, invoice) without a shared transaction. Each completed side
//! effect pushes its inverse onto a compensation list; when a later step
//! fails the list is replayed in reverse and the original error returned.
//! Voiding replays the same inverses from what the invoice recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use spadesk_accounts::{Account, OutletId};
use spadesk_catalog::{ItemKind, Product, ProductId, Service, ServiceId};
use spadesk_core::validation::Violations;
use spadesk_core::{AggregateId, DomainError, DomainResult, Money, TenantId};
use spadesk_inventory::{AllocateStock, StockLedger, StockLedgerCommand};
use spadesk_invoicing::{
    Invoice, InvoiceCommand, InvoiceId, IssueInvoice, LineDiscount, LoyaltyRequest, PaymentInput,
    PricedInvoice, PricingLine, PricingRequest, RegisterPayment, StockAllocationRef,
    TenderRequest, VoidInvoice, MAX_LINE_QUANTITY, format_invoice_number, invoice_sequence_key,
    price,
};
use spadesk_parties::{Customer, CustomerCommand, CustomerId, Employee, EmployeeId};
use spadesk_parties::customer::SettleInvoice;
use spadesk_promotions::{Coupon, CouponCommand, CouponId, GiftCard, GiftCardCommand, GiftCardId, normalize_code};

use crate::backoffice::Backoffice;
use crate::command_dispatcher::DispatchError;

/// One requested invoice line; price and tax come from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub kind: ItemKind,
    pub item_id: AggregateId,
    pub quantity: u32,
    pub discount: Option<LineDiscount>,
    /// Defaults to the invoice's employee.
    pub employee_id: Option<EmployeeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCardTender {
    pub code: String,
    /// Upper bound on what the card pays; `None` uses as much as possible.
    pub amount: Option<Money>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckoutRequest {
    pub outlet_id: Option<OutletId>,
    pub customer_id: Option<CustomerId>,
    pub employee_id: Option<EmployeeId>,
    pub lines: Vec<CheckoutLine>,
    pub coupon_code: Option<String>,
    pub gift_card: Option<GiftCardTender>,
    pub loyalty_points: Option<u64>,
    /// Upper bound on the cashback wallet tender.
    pub wallet_amount: Option<Money>,
    pub payments: Vec<PaymentInput>,
    pub notes: Option<String>,
}

impl CheckoutRequest {
    /// Checks that need no lookups.
    pub fn validate(&self) -> DomainResult<()> {
        let mut v = Violations::new();
        v.check(!self.lines.is_empty(), "at least one line is required");
        for (idx, line) in self.lines.iter().enumerate() {
            v.check(
                (1..=MAX_LINE_QUANTITY).contains(&line.quantity),
                format!(
                    "line {}: quantity must be between 1 and {MAX_LINE_QUANTITY}",
                    idx + 1
                ),
            );
        }
        v.into_result()
    }
}

/// Everything pricing needed, kept for the side-effect phase.
struct Resolved {
    account: Account,
    outlet_id: OutletId,
    outlet_code: String,
    customer: Option<Customer>,
    coupon: Option<Coupon>,
    gift_card: Option<GiftCard>,
    tracked: Vec<(ProductId, u32)>,
    pricing: PricedInvoice,
}

/// Inverse of a completed checkout side effect.
#[derive(Debug, Clone)]
enum Compensation {
    RestoreStock { product_id: ProductId, reference: String },
    ReleaseCoupon(CouponId),
    RefundGiftCard(GiftCardId),
    ReverseSettlement(CustomerId),
}

fn allocation_reference(invoice_id: InvoiceId, product_id: ProductId) -> String {
    format!("invoice:{invoice_id}:{product_id}")
}

fn line_not_found(n: usize, what: &str) -> impl FnOnce(DispatchError) -> DispatchError + '_ {
    move |err| match err {
        DispatchError::NotFound => DispatchError::Validation(format!("line {n}: unknown {what}")),
        other => other,
    }
}

impl Backoffice {
    /// Price a prospective invoice without side effects.
    pub async fn quote(
        &self,
        tenant_id: TenantId,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<PricedInvoice, DispatchError> {
        Ok(self.resolve(tenant_id, request, now).await?.pricing)
    }

    async fn resolve(
        &self,
        tenant_id: TenantId,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<Resolved, DispatchError> {
        request.validate()?;
        let account = self.account(tenant_id).await?;
        let program = account.loyalty;

        let outlet_id = request
            .outlet_id
            .ok_or_else(|| DispatchError::Validation("outlet_id is required".to_string()))?;
        let outlet = self
            .find(self.stores.outlets.as_ref(), tenant_id, &outlet_id)
            .await?;
        outlet.ensure_active(tenant_id)?;

        let customer = match request.customer_id {
            Some(id) => {
                let customer = self.find(self.stores.customers.as_ref(), tenant_id, &id).await?;
                customer.ensure_active(tenant_id)?;
                Some(customer)
            }
            None => None,
        };

        if let Some(id) = request.employee_id {
            self.active_employee(tenant_id, id).await?;
        }

        let mut lines = Vec::with_capacity(request.lines.len());
        let mut tracked: Vec<(ProductId, u32)> = Vec::new();
        for (idx, line) in request.lines.iter().enumerate() {
            let n = idx + 1;
            let employee_id = line.employee_id.or(request.employee_id);
            if let (Some(id), Some(_)) = (employee_id, line.employee_id) {
                self.active_employee(tenant_id, id).await?;
            }
            let (name, unit_price, tax_rate) = match line.kind {
                ItemKind::Service => {
                    let service: Service = self
                        .find(self.stores.services.as_ref(), tenant_id, &ServiceId::new(line.item_id))
                        .await
                        .map_err(line_not_found(n, "service"))?;
                    service.ensure_sellable(tenant_id)?;
                    (service.name.clone(), service.price, service.tax_rate)
                }
                ItemKind::Product => {
                    let product_id = ProductId::new(line.item_id);
                    let product: Product = self
                        .find(self.stores.products.as_ref(), tenant_id, &product_id)
                        .await
                        .map_err(line_not_found(n, "product"))?;
                    product.ensure_sellable(tenant_id)?;
                    if product.track_inventory() && line.quantity > 0 {
                        match tracked.iter_mut().find(|(id, _)| *id == product_id) {
                            Some((_, qty)) => *qty = qty.saturating_add(line.quantity),
                            None => tracked.push((product_id, line.quantity)),
                        }
                    }
                    (product.name().to_string(), product.price(), product.tax_rate())
                }
            };
            lines.push(PricingLine {
                kind: line.kind,
                item_id: line.item_id,
                name,
                quantity: line.quantity,
                unit_price,
                tax_rate: tax_rate.unwrap_or(account.tax.default_rate),
                discount: line.discount,
                employee_id,
            });
        }

        let coupon = match request.coupon_code.as_deref().map(normalize_code) {
            Some(code) if !code.is_empty() => {
                let coupon = self.coupon_by_code(tenant_id, &code).await?;
                coupon.check_applicable(now, request.customer_id)?;
                Some(coupon)
            }
            _ => None,
        };

        let gift_card = match &request.gift_card {
            Some(tender) => {
                let card = self.gift_card_by_code(tenant_id, &tender.code).await?;
                card.ensure_usable(now)?;
                Some(card)
            }
            None => None,
        };

        let loyalty = match request.loyalty_points.filter(|p| *p > 0) {
            Some(points) => {
                let customer = customer.as_ref().ok_or_else(|| {
                    DispatchError::Validation("loyalty redemption requires a customer".to_string())
                })?;
                Some(LoyaltyRequest {
                    points,
                    balance: customer.loyalty_points,
                })
            }
            None => None,
        };

        let cashback = match request.wallet_amount {
            Some(cap) => {
                let customer = customer.as_ref().ok_or_else(|| {
                    DispatchError::Validation("wallet payment requires a customer".to_string())
                })?;
                Some(TenderRequest {
                    available: customer.wallet_balance,
                    cap: Some(cap),
                })
            }
            None => None,
        };

        let referral_rate = customer
            .as_ref()
            .filter(|c| c.is_referral_eligible() && !program.referral_discount_rate.is_zero())
            .map(|_| program.referral_discount_rate);

        let mut pricing = price(&PricingRequest {
            lines,
            prices_include_tax: account.tax.prices_include_tax,
            coupon: coupon.as_ref().map(Into::into),
            referral_rate,
            gift_card: gift_card.as_ref().map(|card| TenderRequest {
                available: card.balance(),
                cap: request.gift_card.as_ref().and_then(|t| t.amount),
            }),
            loyalty,
            cashback,
            program,
        })?;
        if customer.is_none() {
            pricing.points_earned = 0;
            pricing.cashback_earned = Money::ZERO;
        }

        Ok(Resolved {
            account,
            outlet_id,
            outlet_code: outlet.code,
            customer,
            coupon,
            gift_card,
            tracked,
            pricing,
        })
    }

    async fn active_employee(
        &self,
        tenant_id: TenantId,
        id: EmployeeId,
    ) -> Result<Employee, DispatchError> {
        let employee = self.find(self.stores.employees.as_ref(), tenant_id, &id).await?;
        employee.ensure_active(tenant_id)?;
        Ok(employee)
    }

    /// Visible coupon with `code` (already normalized), else `NotFound`.
    pub async fn coupon_by_code(&self, tenant_id: TenantId, code: &str) -> Result<Coupon, DispatchError> {
        let code = normalize_code(code);
        self.list(self.stores.coupons.as_ref(), tenant_id)
            .await?
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(DispatchError::NotFound)
    }

    pub async fn gift_card_by_code(
        &self,
        tenant_id: TenantId,
        code: &str,
    ) -> Result<GiftCard, DispatchError> {
        let code = normalize_code(code);
        self.list(self.stores.gift_cards.as_ref(), tenant_id)
            .await?
            .into_iter()
            .find(|c| c.code() == code)
            .ok_or(DispatchError::NotFound)
    }

    /// Issue an invoice: price it, run the side effects, record it.
    #[instrument(skip_all, fields(tenant_id = %tenant_id), err)]
    pub async fn create_invoice(
        &self,
        tenant_id: TenantId,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<Invoice, DispatchError> {
        let resolved = self.resolve(tenant_id, &request, now).await?;

        let mut paid = Money::ZERO;
        for payment in &request.payments {
            payment.amount.ensure_positive("payment amount")?;
            paid = paid
                .checked_add(payment.amount)
                .ok_or_else(|| DomainError::invariant("payment total overflow"))?;
        }
        if paid > resolved.pricing.amount_due {
            return Err(DispatchError::InvariantViolation("cannot overpay invoice".to_string()));
        }

        let key = invoice_sequence_key(&resolved.account.numbering, &resolved.outlet_code, now);
        let seq = self.stores.sequences.next(tenant_id, &key).await?;
        let number =
            format_invoice_number(&resolved.account.numbering, &resolved.outlet_code, now, seq);
        let invoice_id = InvoiceId::generate();

        let mut undo = Vec::new();
        match self
            .apply_side_effects(tenant_id, invoice_id, number, &request, &resolved, now, &mut undo)
            .await
        {
            Ok(invoice) => {
                info!(number = invoice.number(), total = %invoice.amount_due(), "invoice issued");
                self.reward_referrer(tenant_id, resolved.customer.as_ref(), &resolved.account, now)
                    .await;
                Ok(invoice)
            }
            Err(err) => {
                warn!(error = %err, steps = undo.len(), "checkout failed; compensating");
                self.compensate(tenant_id, invoice_id.aggregate_id(), undo, now).await;
                Err(err)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_side_effects(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        number: String,
        request: &CheckoutRequest,
        resolved: &Resolved,
        now: DateTime<Utc>,
        undo: &mut Vec<Compensation>,
    ) -> Result<Invoice, DispatchError> {
        let pricing = &resolved.pricing;
        let invoice_ref = invoice_id.aggregate_id();

        let mut stock_allocations = Vec::with_capacity(resolved.tracked.len());
        for (product_id, quantity) in &resolved.tracked {
            let reference = allocation_reference(invoice_id, *product_id);
            let ledger = self
                .dispatcher
                .dispatch_retrying(
                    self.stores.stock.as_ref(),
                    tenant_id,
                    *product_id,
                    StockLedgerCommand::AllocateStock(AllocateStock {
                        tenant_id,
                        outlet: resolved.outlet_id,
                        quantity: *quantity,
                        reference: reference.clone(),
                        occurred_at: now,
                    }),
                    StockLedger::empty,
                )
                .await?
                .aggregate;
            undo.push(Compensation::RestoreStock {
                product_id: *product_id,
                reference: reference.clone(),
            });
            stock_allocations.push(StockAllocationRef {
                product_id: *product_id,
                cost: match ledger.allocation(&reference) {
                    Some(allocation) => allocation.cost()?,
                    None => Money::ZERO,
                },
                reference,
                quantity: *quantity,
            });
        }

        if let Some(coupon) = &resolved.coupon {
            self.dispatcher
                .dispatch_retrying(
                    self.stores.coupons.as_ref(),
                    tenant_id,
                    coupon.id,
                    CouponCommand::Redeem {
                        tenant_id,
                        invoice_id: invoice_ref,
                        customer: request.customer_id,
                        occurred_at: now,
                    },
                    Coupon::empty,
                )
                .await?;
            undo.push(Compensation::ReleaseCoupon(coupon.id));
        }

        if let Some(card) = resolved.gift_card.as_ref().filter(|_| pricing.gift_card_applied.is_positive()) {
            self.dispatcher
                .dispatch_retrying(
                    self.stores.gift_cards.as_ref(),
                    tenant_id,
                    card.id_typed(),
                    GiftCardCommand::Redeem {
                        tenant_id,
                        invoice_id: invoice_ref,
                        amount: pricing.gift_card_applied,
                        occurred_at: now,
                    },
                    GiftCard::empty,
                )
                .await?;
            undo.push(Compensation::RefundGiftCard(card.id_typed()));
        }

        if let Some(customer) = &resolved.customer {
            self.dispatcher
                .dispatch_retrying(
                    self.stores.customers.as_ref(),
                    tenant_id,
                    customer.id,
                    CustomerCommand::SettleInvoice(SettleInvoice {
                        tenant_id,
                        invoice_id: invoice_ref,
                        points_redeemed: pricing.loyalty_points_used,
                        points_earned: pricing.points_earned,
                        wallet_debited: pricing.cashback_applied,
                        wallet_credited: pricing.cashback_earned,
                        spend: pricing.grand_total,
                        occurred_at: now,
                    }),
                    Customer::empty,
                )
                .await?;
            undo.push(Compensation::ReverseSettlement(customer.id));
        }

        let issue = IssueInvoice {
            tenant_id,
            invoice_id,
            number,
            outlet_id: resolved.outlet_id,
            customer_id: request.customer_id,
            employee_id: request.employee_id,
            pricing: pricing.clone(),
            coupon_id: resolved.coupon.as_ref().map(|c| c.id),
            gift_card_id: resolved
                .gift_card
                .as_ref()
                .filter(|_| pricing.gift_card_applied.is_positive())
                .map(GiftCard::id_typed),
            stock_allocations,
            payments: request.payments.clone(),
            notes: request.notes.clone(),
            occurred_at: now,
        };
        self.dispatch(
            self.stores.invoices.as_ref(),
            tenant_id,
            invoice_id,
            InvoiceCommand::IssueInvoice(Box::new(issue)),
            Invoice::empty,
        )
        .await
    }

    /// First invoice of a referred customer earns the referrer points.
    async fn reward_referrer(
        &self,
        tenant_id: TenantId,
        customer: Option<&Customer>,
        account: &Account,
        now: DateTime<Utc>,
    ) {
        let program = &account.loyalty;
        let Some(customer) = customer.filter(|c| c.is_referral_eligible()) else {
            return;
        };
        let Some(referrer) = customer.referred_by else {
            return;
        };
        if !program.enabled || program.referrer_reward_points == 0 {
            return;
        }
        let result = self
            .dispatcher
            .dispatch_retrying(
                self.stores.customers.as_ref(),
                tenant_id,
                referrer,
                CustomerCommand::AwardReferralPoints {
                    tenant_id,
                    referee: customer.id,
                    points: u64::from(program.referrer_reward_points),
                    occurred_at: now,
                },
                Customer::empty,
            )
            .await;
        if let Err(err) = result {
            warn!(error = %err, referrer = %referrer, "referral reward not booked");
        }
    }

    /// Run inverses newest-first. Failures are logged; the remaining steps
    /// still run.
    async fn compensate(
        &self,
        tenant_id: TenantId,
        invoice_ref: AggregateId,
        steps: Vec<Compensation>,
        now: DateTime<Utc>,
    ) {
        for step in steps.into_iter().rev() {
            let result = match &step {
                Compensation::RestoreStock { product_id, reference } => self
                    .dispatcher
                    .dispatch_retrying(
                        self.stores.stock.as_ref(),
                        tenant_id,
                        *product_id,
                        StockLedgerCommand::RestoreAllocation {
                            tenant_id,
                            reference: reference.clone(),
                            occurred_at: now,
                        },
                        StockLedger::empty,
                    )
                    .await
                    .map(|_| ()),
                Compensation::ReleaseCoupon(id) => self
                    .dispatcher
                    .dispatch_retrying(
                        self.stores.coupons.as_ref(),
                        tenant_id,
                        *id,
                        CouponCommand::ReleaseRedemption {
                            tenant_id,
                            invoice_id: invoice_ref,
                            occurred_at: now,
                        },
                        Coupon::empty,
                    )
                    .await
                    .map(|_| ()),
                Compensation::RefundGiftCard(id) => self
                    .dispatcher
                    .dispatch_retrying(
                        self.stores.gift_cards.as_ref(),
                        tenant_id,
                        *id,
                        GiftCardCommand::Refund {
                            tenant_id,
                            invoice_id: invoice_ref,
                            occurred_at: now,
                        },
                        GiftCard::empty,
                    )
                    .await
                    .map(|_| ()),
                Compensation::ReverseSettlement(id) => self
                    .dispatcher
                    .dispatch_retrying(
                        self.stores.customers.as_ref(),
                        tenant_id,
                        *id,
                        CustomerCommand::ReverseInvoice {
                            tenant_id,
                            invoice_id: invoice_ref,
                            occurred_at: now,
                        },
                        Customer::empty,
                    )
                    .await
                    .map(|_| ()),
            };
            if let Err(err) = result {
                warn!(error = %err, step = ?step, "compensation failed");
            }
        }
    }

    pub async fn register_payment(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        payment: PaymentInput,
        now: DateTime<Utc>,
    ) -> Result<Invoice, DispatchError> {
        self.find(self.stores.invoices.as_ref(), tenant_id, &invoice_id).await?;
        self.dispatcher
            .dispatch_retrying(
                self.stores.invoices.as_ref(),
                tenant_id,
                invoice_id,
                InvoiceCommand::RegisterPayment(RegisterPayment {
                    tenant_id,
                    invoice_id,
                    payment: payment.clone(),
                    occurred_at: now,
                }),
                Invoice::empty,
            )
            .await
            .map(|d| d.aggregate)
    }

    /// Void an invoice and undo what issuing it did.
    #[instrument(skip_all, fields(tenant_id = %tenant_id, invoice_id = %invoice_id), err)]
    pub async fn void_invoice(
        &self,
        tenant_id: TenantId,
        invoice_id: InvoiceId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Invoice, DispatchError> {
        self.find(self.stores.invoices.as_ref(), tenant_id, &invoice_id).await?;
        let invoice = self
            .dispatcher
            .dispatch_retrying(
                self.stores.invoices.as_ref(),
                tenant_id,
                invoice_id,
                InvoiceCommand::VoidInvoice(VoidInvoice {
                    tenant_id,
                    invoice_id,
                    reason: reason.clone(),
                    occurred_at: now,
                }),
                Invoice::empty,
            )
            .await?
            .aggregate;

        let mut steps: Vec<Compensation> = invoice
            .stock_allocations()
            .iter()
            .map(|a| Compensation::RestoreStock {
                product_id: a.product_id,
                reference: a.reference.clone(),
            })
            .collect();
        steps.extend(invoice.coupon_id().map(Compensation::ReleaseCoupon));
        steps.extend(invoice.gift_card_id().map(Compensation::RefundGiftCard));
        steps.extend(invoice.customer_id().map(Compensation::ReverseSettlement));
        self.compensate(tenant_id, invoice_id.aggregate_id(), steps, now).await;

        info!(number = invoice.number(), "invoice voided");
        Ok(invoice)
    }
}
