//! Integration tests for the back-office workflows over in-memory stores.
//!
//! Verifies:
//! - Checkout stacks discounts and performs every side effect
//! - Voiding (and failed checkouts) undo those side effects
//! - FIFO costing, invoice numbering and tenant isolation
//! - Purchase order receipts land on the stock ledger
//! - Rewards, scheduled jobs and receipt e-mails

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use spadesk_accounts::{
    Account, AccountCommand, AccountProfile, BirthdayCoupon, LoyaltyProgram, Outlet,
    OutletCommand, OutletId, TaxSettings,
};
use spadesk_catalog::product::CreateProduct;
use spadesk_catalog::{
    ItemKind, Product, ProductCommand, ProductId, ProductPatch, Service, ServiceCommand,
    ServiceId, ServicePatch,
};
use spadesk_core::{AggregateId, ExpectedVersion, Money, Rate, TenantId};
use spadesk_invoicing::{InvoiceStatus, PaymentInput, PaymentMode};
use spadesk_parties::customer::RegisterCustomer;
use spadesk_parties::vendor::RegisterVendor;
use spadesk_parties::{
    Customer, CustomerCommand, CustomerId, CustomerPatch, Vendor, VendorCommand, VendorId,
};
use spadesk_promotions::{
    Coupon, CouponCommand, CouponId, CouponKind, CouponScope, CouponTerms, DiscountRule,
    GiftCard, GiftCardCommand, GiftCardId,
};
use spadesk_purchasing::{PurchaseOrderStatus, ReceiptLine};
use spadesk_inventory::StockSource;

use crate::backoffice::{Backoffice, generate_code};
use crate::checkout::{CheckoutLine, CheckoutRequest, GiftCardTender};
use crate::command_dispatcher::DispatchError;
use crate::listeners::spawn_listeners;
use crate::mailer::LogMailer;
use crate::metrics::Metrics;
use crate::store::{StoreError, TenantStore};
use crate::stores::Stores;
use crate::unique_keys::{KeyKind, UniqueKey, UniqueKeyStore};

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn program() -> LoyaltyProgram {
    LoyaltyProgram {
        enabled: true,
        spend_unit: Money::from_minor(10_000),
        points_per_unit: 10,
        point_value: Money::from_minor(100),
        min_redeem_points: 100,
        cashback_rate: Rate::ZERO,
        referral_discount_rate: Rate::from_bps(1000),
        referrer_reward_points: 50,
        birthday_coupon: None,
    }
}

struct Fixture {
    office: Backoffice,
    mailer: Arc<LogMailer>,
    tenant: TenantId,
    outlet: OutletId,
    massage: ServiceId,
    oil: ProductId,
}

impl Fixture {
    async fn new() -> Self {
        let mailer = Arc::new(LogMailer::new("no-reply@spa.test"));
        let office = Backoffice::new(Stores::in_memory(), Arc::default(), mailer.clone());
        let tenant = TenantId::new();
        let now = at(1, 9);

        office
            .dispatch(
                office.stores.accounts.as_ref(),
                tenant,
                AggregateId::from(tenant),
                AccountCommand::Open {
                    tenant_id: tenant,
                    profile: AccountProfile {
                        business_name: "Lotus Spa".into(),
                        email: "owner@lotus.test".into(),
                        phone: None,
                        currency: "INR".into(),
                    },
                    occurred_at: now,
                },
                Account::empty,
            )
            .await
            .unwrap();
        for command in [
            AccountCommand::UpdateTaxSettings {
                tenant_id: tenant,
                tax: TaxSettings {
                    default_rate: Rate::from_bps(1800),
                    prices_include_tax: false,
                },
                occurred_at: now,
            },
            AccountCommand::UpdateLoyaltyProgram {
                tenant_id: tenant,
                loyalty: program(),
                occurred_at: now,
            },
        ] {
            office
                .dispatch(
                    office.stores.accounts.as_ref(),
                    tenant,
                    AggregateId::from(tenant),
                    command,
                    Account::empty,
                )
                .await
                .unwrap();
        }

        let mut fixture = Self {
            office,
            mailer,
            tenant,
            outlet: OutletId::generate(),
            massage: ServiceId::generate(),
            oil: ProductId::generate(),
        };
        fixture.outlet = fixture.add_outlet("MAIN").await;

        fixture
            .office
            .dispatch(
                fixture.office.stores.services.as_ref(),
                tenant,
                fixture.massage,
                ServiceCommand::Create {
                    tenant_id: tenant,
                    details: ServicePatch {
                        name: Some("Deep Tissue Massage".into()),
                        duration_minutes: Some(60),
                        price: Some(Money::from_minor(100_000)),
                        ..Default::default()
                    },
                    occurred_at: now,
                },
                Service::empty,
            )
            .await
            .unwrap();
        fixture.oil = fixture.add_product("OIL-50", 50_000).await;
        fixture
    }

    async fn add_outlet(&self, code: &str) -> OutletId {
        let id = OutletId::generate();
        self.office
            .dispatch(
                self.office.stores.outlets.as_ref(),
                self.tenant,
                id,
                OutletCommand::Create {
                    tenant_id: self.tenant,
                    name: format!("Outlet {code}"),
                    code: code.into(),
                    address: None,
                    phone: None,
                    occurred_at: at(1, 9),
                },
                Outlet::empty,
            )
            .await
            .unwrap();
        id
    }

    async fn add_product(&self, sku: &str, price: i64) -> ProductId {
        let id = ProductId::generate();
        self.office
            .dispatch(
                self.office.stores.products.as_ref(),
                self.tenant,
                id,
                ProductCommand::CreateProduct(CreateProduct {
                    tenant_id: self.tenant,
                    product_id: id,
                    details: ProductPatch {
                        sku: Some(sku.into()),
                        name: Some(format!("Product {sku}")),
                        price: Some(Money::from_minor(price)),
                        track_inventory: Some(true),
                        reorder_level: Some(2),
                        ..Default::default()
                    },
                    occurred_at: at(1, 9),
                }),
                Product::empty,
            )
            .await
            .unwrap();
        id
    }

    async fn add_customer(&self, name: &str, referred_by: Option<CustomerId>) -> CustomerId {
        let id = CustomerId::generate();
        self.office
            .dispatch(
                self.office.stores.customers.as_ref(),
                self.tenant,
                id,
                CustomerCommand::Register(RegisterCustomer {
                    tenant_id: self.tenant,
                    details: CustomerPatch {
                        name: Some(name.into()),
                        email: Some(format!("{}@guest.test", name.to_lowercase())),
                        ..Default::default()
                    },
                    referral_code: generate_code(8),
                    referred_by,
                    occurred_at: at(1, 9),
                }),
                Customer::empty,
            )
            .await
            .unwrap();
        id
    }

    async fn receive(&self, product: ProductId, outlet: OutletId, qty: u32, cost: i64, when: DateTime<Utc>) {
        self.office
            .receive_stock(self.tenant, product, outlet, qty, Money::from_minor(cost), when)
            .await
            .unwrap();
    }

    async fn add_coupon(&self, code: &str, rule: DiscountRule) -> CouponId {
        let id = CouponId::generate();
        self.office
            .dispatch(
                self.office.stores.coupons.as_ref(),
                self.tenant,
                id,
                CouponCommand::Create {
                    tenant_id: self.tenant,
                    terms: CouponTerms {
                        code: code.into(),
                        description: None,
                        kind: CouponKind::Standard,
                        rule,
                        max_discount: None,
                        min_spend: Money::ZERO,
                        scope: CouponScope::All,
                        valid_from: at(1, 0),
                        valid_until: at(31, 0),
                        usage_limit: Some(10),
                        per_customer_limit: None,
                    },
                    occurred_at: at(1, 9),
                },
                Coupon::empty,
            )
            .await
            .unwrap();
        id
    }

    async fn add_gift_card(&self, code: &str, value: i64) -> GiftCardId {
        let id = GiftCardId::generate();
        self.office
            .dispatch(
                self.office.stores.gift_cards.as_ref(),
                self.tenant,
                id,
                GiftCardCommand::Issue {
                    tenant_id: self.tenant,
                    code: code.into(),
                    initial_value: Money::from_minor(value),
                    owner: None,
                    expires_at: at(1, 9) + Duration::days(60),
                    occurred_at: at(1, 9),
                },
                GiftCard::empty,
            )
            .await
            .unwrap();
        id
    }

    fn line(&self, kind: ItemKind, item: impl Into<AggregateId>, quantity: u32) -> CheckoutLine {
        CheckoutLine {
            kind,
            item_id: item.into(),
            quantity,
            discount: None,
            employee_id: None,
        }
    }

    fn sale(&self, lines: Vec<CheckoutLine>) -> CheckoutRequest {
        CheckoutRequest {
            outlet_id: Some(self.outlet),
            lines,
            ..Default::default()
        }
    }

    async fn on_hand(&self, product: ProductId) -> u64 {
        self.office
            .stock_level(self.tenant, product, None)
            .await
            .unwrap()
            .on_hand
    }

    async fn customer(&self, id: CustomerId) -> Customer {
        self.office
            .find(self.office.stores.customers.as_ref(), self.tenant, &id)
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn checkout_stacks_coupon_gift_card_and_tax_and_books_side_effects() {
    let f = Fixture::new().await;
    f.receive(f.oil, f.outlet, 5, 20_000, at(2, 9)).await;
    let coupon = f.add_coupon("SAVE10", DiscountRule::Percent(Rate::from_bps(1000))).await;
    let card = f.add_gift_card("GIFT-300", 30_000).await;
    let asha = f.add_customer("Asha", None).await;

    let mut request = f.sale(vec![
        f.line(ItemKind::Service, f.massage, 1),
        f.line(ItemKind::Product, f.oil, 2),
    ]);
    request.customer_id = Some(asha);
    request.coupon_code = Some("save10".into());
    request.gift_card = Some(GiftCardTender {
        code: "gift-300".into(),
        amount: None,
    });
    request.payments = vec![PaymentInput {
        amount: Money::from_minor(100_000),
        mode: PaymentMode::Cash,
        reference: None,
    }];

    let invoice = f.office.create_invoice(f.tenant, request, at(10, 11)).await.unwrap();
    let p = invoice.pricing().unwrap();

    assert_eq!(invoice.number(), "INV-MAIN-2026-00001");
    assert_eq!(p.gross, Money::from_minor(200_000));
    assert_eq!(p.coupon_discount, Money::from_minor(20_000));
    assert_eq!(p.tax_total, Money::from_minor(32_400));
    assert_eq!(p.grand_total, Money::from_minor(212_400));
    assert_eq!(p.gift_card_applied, Money::from_minor(30_000));
    assert_eq!(p.amount_due, Money::from_minor(182_400));
    assert_eq!(p.points_earned, 180);
    assert_eq!(invoice.status(), InvoiceStatus::PartiallyPaid);
    assert_eq!(invoice.stock_allocations()[0].cost, Money::from_minor(40_000));

    assert_eq!(f.on_hand(f.oil).await, 3);
    let coupon: Coupon = f.office.stores.coupons.get(f.tenant, &coupon).await.unwrap().unwrap();
    assert_eq!(coupon.times_used, 1);
    let card: GiftCard = f.office.stores.gift_cards.get(f.tenant, &card).await.unwrap().unwrap();
    assert_eq!(card.balance(), Money::ZERO);
    let asha = f.customer(asha).await;
    assert_eq!(asha.loyalty_points, 180);
    assert_eq!(asha.invoice_count, 1);
    assert_eq!(asha.lifetime_spend, Money::from_minor(212_400));
}

#[tokio::test]
async fn voiding_restores_stock_coupon_gift_card_and_customer_balances() {
    let f = Fixture::new().await;
    f.receive(f.oil, f.outlet, 5, 20_000, at(2, 9)).await;
    let coupon = f.add_coupon("FLAT50", DiscountRule::Flat(Money::from_minor(5_000))).await;
    let card = f.add_gift_card("GIFT-100", 10_000).await;
    let asha = f.add_customer("Asha", None).await;

    let mut request = f.sale(vec![f.line(ItemKind::Product, f.oil, 2)]);
    request.customer_id = Some(asha);
    request.coupon_code = Some("FLAT50".into());
    request.gift_card = Some(GiftCardTender {
        code: "GIFT-100".into(),
        amount: None,
    });
    let invoice = f.office.create_invoice(f.tenant, request, at(10, 11)).await.unwrap();
    assert_eq!(f.on_hand(f.oil).await, 3);

    let voided = f
        .office
        .void_invoice(f.tenant, invoice.id_typed(), "customer changed mind".into(), at(10, 12))
        .await
        .unwrap();
    assert_eq!(voided.status(), InvoiceStatus::Void);

    assert_eq!(f.on_hand(f.oil).await, 5);
    let coupon: Coupon = f.office.stores.coupons.get(f.tenant, &coupon).await.unwrap().unwrap();
    assert_eq!(coupon.times_used, 0);
    let card: GiftCard = f.office.stores.gift_cards.get(f.tenant, &card).await.unwrap().unwrap();
    assert_eq!(card.balance(), Money::from_minor(10_000));
    let asha = f.customer(asha).await;
    assert_eq!(asha.loyalty_points, 0);
    assert_eq!(asha.invoice_count, 0);

    let again = f
        .office
        .void_invoice(f.tenant, invoice.id_typed(), "twice".into(), at(10, 13))
        .await;
    assert!(matches!(again, Err(DispatchError::Conflict(_))));
}

#[tokio::test]
async fn fifo_costs_oldest_batch_first_and_never_allocates_partially() {
    let f = Fixture::new().await;
    f.receive(f.oil, f.outlet, 2, 10_000, at(2, 9)).await;
    f.receive(f.oil, f.outlet, 3, 20_000, at(3, 9)).await;

    let invoice = f
        .office
        .create_invoice(f.tenant, f.sale(vec![f.line(ItemKind::Product, f.oil, 3)]), at(10, 11))
        .await
        .unwrap();
    assert_eq!(invoice.stock_allocations()[0].cost, Money::from_minor(40_000));
    assert_eq!(f.on_hand(f.oil).await, 2);

    let too_many = f
        .office
        .create_invoice(f.tenant, f.sale(vec![f.line(ItemKind::Product, f.oil, 3)]), at(10, 12))
        .await;
    assert!(matches!(too_many, Err(DispatchError::InvariantViolation(_))));
    assert_eq!(f.on_hand(f.oil).await, 2);
}

#[tokio::test]
async fn failed_checkout_compensates_completed_allocations() {
    let f = Fixture::new().await;
    let balm = f.add_product("BALM-20", 30_000).await;
    let other = f.add_outlet("CITY").await;
    f.receive(f.oil, f.outlet, 4, 20_000, at(2, 9)).await;
    f.receive(balm, other, 4, 10_000, at(2, 9)).await;

    let result = f
        .office
        .create_invoice(
            f.tenant,
            f.sale(vec![
                f.line(ItemKind::Product, f.oil, 2),
                f.line(ItemKind::Product, balm, 1),
            ]),
            at(10, 11),
        )
        .await;

    assert!(matches!(result, Err(DispatchError::InvariantViolation(_))));
    assert_eq!(f.on_hand(f.oil).await, 4);
    assert!(f.office.stores.invoices.list(f.tenant).await.unwrap().is_empty());

    // The failed attempt consumed a number.
    let invoice = f
        .office
        .create_invoice(f.tenant, f.sale(vec![f.line(ItemKind::Product, f.oil, 1)]), at(10, 12))
        .await
        .unwrap();
    assert_eq!(invoice.number(), "INV-MAIN-2026-00002");
}

#[tokio::test]
async fn invoice_numbers_are_sequential_per_outlet() {
    let f = Fixture::new().await;
    let city = f.add_outlet("CITY").await;
    let service = || f.sale(vec![f.line(ItemKind::Service, f.massage, 1)]);

    let mut numbers = Vec::new();
    for hour in 10..13 {
        let invoice = f.office.create_invoice(f.tenant, service(), at(10, hour)).await.unwrap();
        numbers.push(invoice.number().to_string());
    }
    let mut at_city = service();
    at_city.outlet_id = Some(city);
    let city_invoice = f.office.create_invoice(f.tenant, at_city, at(10, 14)).await.unwrap();

    assert_eq!(
        numbers,
        ["INV-MAIN-2026-00001", "INV-MAIN-2026-00002", "INV-MAIN-2026-00003"]
    );
    assert_eq!(city_invoice.number(), "INV-CITY-2026-00001");
}

#[tokio::test]
async fn tenants_cannot_reach_each_others_records() {
    let f = Fixture::new().await;
    let asha = f.add_customer("Asha", None).await;
    let intruder = TenantId::new();

    let lookup = f
        .office
        .find(f.office.stores.customers.as_ref(), intruder, &asha)
        .await;
    assert!(matches!(lookup, Err(DispatchError::NotFound)));

    let checkout = f
        .office
        .quote(intruder, &f.sale(vec![f.line(ItemKind::Service, f.massage, 1)]), at(10, 11))
        .await;
    assert!(matches!(checkout, Err(DispatchError::NotFound)));

    let update = f
        .office
        .dispatch(
            f.office.stores.customers.as_ref(),
            intruder,
            asha,
            CustomerCommand::Delete {
                tenant_id: intruder,
                occurred_at: at(10, 11),
            },
            Customer::empty,
        )
        .await;
    assert!(update.is_err());
    assert!(f.customer(asha).await.active);
}

#[tokio::test]
async fn referred_customers_get_a_first_invoice_discount_and_reward_the_referrer() {
    let f = Fixture::new().await;
    let asha = f.add_customer("Asha", None).await;
    let ravi = f.add_customer("Ravi", Some(asha)).await;

    let mut first = f.sale(vec![f.line(ItemKind::Service, f.massage, 1)]);
    first.customer_id = Some(ravi);
    let invoice = f.office.create_invoice(f.tenant, first.clone(), at(10, 11)).await.unwrap();
    let p = invoice.pricing().unwrap();
    assert_eq!(p.referral_discount, Money::from_minor(10_000));
    assert_eq!(p.grand_total, Money::from_minor(106_200));
    assert_eq!(f.customer(asha).await.loyalty_points, 50);

    let second = f.office.create_invoice(f.tenant, first, at(10, 12)).await.unwrap();
    assert_eq!(second.pricing().unwrap().referral_discount, Money::ZERO);
    assert_eq!(f.customer(asha).await.loyalty_points, 50);
}

#[tokio::test]
async fn loyalty_points_pay_part_of_a_later_invoice() {
    let f = Fixture::new().await;
    let asha = f.add_customer("Asha", None).await;
    let mut request = f.sale(vec![f.line(ItemKind::Service, f.massage, 1)]);
    request.customer_id = Some(asha);
    f.office.create_invoice(f.tenant, request.clone(), at(10, 11)).await.unwrap();
    assert_eq!(f.customer(asha).await.loyalty_points, 110);

    request.loyalty_points = Some(100);
    let invoice = f.office.create_invoice(f.tenant, request, at(11, 11)).await.unwrap();
    let p = invoice.pricing().unwrap();
    assert_eq!(p.loyalty_applied, Money::from_minor(10_000));
    assert_eq!(p.loyalty_points_used, 100);
    assert_eq!(p.amount_due, Money::from_minor(108_000));
    // 110 - 100 redeemed + 100 earned on 1080.00
    assert_eq!(f.customer(asha).await.loyalty_points, 110);
}

#[tokio::test]
async fn loyalty_without_a_customer_is_rejected() {
    let f = Fixture::new().await;
    let mut request = f.sale(vec![f.line(ItemKind::Service, f.massage, 1)]);
    request.loyalty_points = Some(100);

    let result = f.office.quote(f.tenant, &request, at(10, 11)).await;
    assert!(matches!(result, Err(DispatchError::Validation(_))));
}

#[tokio::test]
async fn purchase_order_receipts_become_fifo_batches() {
    let f = Fixture::new().await;
    let vendor = VendorId::generate();
    f.office
        .dispatch(
            f.office.stores.vendors.as_ref(),
            f.tenant,
            vendor,
            VendorCommand::Register(RegisterVendor {
                tenant_id: f.tenant,
                vendor_id: vendor,
                name: "Aroma Supplies".into(),
                contact: None,
                occurred_at: at(1, 9),
            }),
            Vendor::empty,
        )
        .await
        .unwrap();

    let order = f
        .office
        .create_purchase_order(f.tenant, vendor, f.outlet, None, at(2, 9))
        .await
        .unwrap();
    assert_eq!(order.number(), "PO-2026-00001");
    let id = order.id_typed();
    f.office
        .add_purchase_order_line(f.tenant, id, f.oil, 10, Money::from_minor(15_000), at(2, 9))
        .await
        .unwrap();
    f.office.submit_purchase_order(f.tenant, id, at(2, 10)).await.unwrap();

    let order = f
        .office
        .receive_purchase_order(
            f.tenant,
            id,
            vec![ReceiptLine {
                line_no: 1,
                quantity: 4,
            }],
            at(3, 9),
        )
        .await
        .unwrap();
    assert_eq!(order.status(), PurchaseOrderStatus::PartiallyReceived);

    let ledger = f.office.stores.stock.get(f.tenant, &f.oil).await.unwrap().unwrap();
    assert_eq!(ledger.on_hand(Some(f.outlet)), 4);
    assert_eq!(ledger.batches()[0].unit_cost, Money::from_minor(15_000));
    assert_eq!(
        ledger.batches()[0].source,
        StockSource::PurchaseOrder {
            order_id: id.aggregate_id(),
            line_no: 1
        }
    );

    let cancel = f.office.cancel_purchase_order(f.tenant, id, None, at(3, 10)).await;
    assert!(cancel.is_err());
}

#[tokio::test]
async fn low_stock_lists_tracked_products_at_or_below_reorder_level() {
    let f = Fixture::new().await;
    let balm = f.add_product("BALM-20", 30_000).await;
    f.receive(f.oil, f.outlet, 2, 20_000, at(2, 9)).await;
    f.receive(balm, f.outlet, 9, 10_000, at(2, 9)).await;

    let low = f.office.low_stock(f.tenant, None).await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].product_id, f.oil);

    f.office
        .adjust_stock(f.tenant, balm, f.outlet, -8, "damaged".into(), at(3, 9))
        .await
        .unwrap();
    assert_eq!(f.office.low_stock(f.tenant, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn rewards_turn_points_into_a_customer_bound_coupon() {
    let f = Fixture::new().await;
    let asha = f.add_customer("Asha", None).await;
    let ravi = f.add_customer("Ravi", None).await;
    let mut request = f.sale(vec![f.line(ItemKind::Service, f.massage, 2)]);
    request.customer_id = Some(asha);
    f.office.create_invoice(f.tenant, request, at(10, 11)).await.unwrap();
    assert_eq!(f.customer(asha).await.loyalty_points, 230);

    let coupon = f.office.redeem_reward(f.tenant, asha, 200, at(11, 9)).await.unwrap();
    assert_eq!(coupon.terms.rule, DiscountRule::Flat(Money::from_minor(20_000)));
    assert_eq!(f.customer(asha).await.loyalty_points, 30);

    let mut theirs = f.sale(vec![f.line(ItemKind::Service, f.massage, 1)]);
    theirs.customer_id = Some(ravi);
    theirs.coupon_code = Some(coupon.code().to_string());
    assert!(f.office.quote(f.tenant, &theirs, at(11, 10)).await.is_err());

    let too_many = f.office.redeem_reward(f.tenant, asha, 200, at(11, 9)).await;
    assert!(matches!(too_many, Err(DispatchError::InvariantViolation(_))));
}

#[tokio::test]
async fn greetings_run_once_per_day_and_issue_birthday_coupons() {
    let f = Fixture::new().await;
    let mut loyalty = program();
    loyalty.birthday_coupon = Some(BirthdayCoupon {
        rate: Rate::from_bps(1500),
        valid_days: 14,
    });
    f.office
        .dispatch(
            f.office.stores.accounts.as_ref(),
            f.tenant,
            AggregateId::from(f.tenant),
            AccountCommand::UpdateLoyaltyProgram {
                tenant_id: f.tenant,
                loyalty,
                occurred_at: at(1, 9),
            },
            Account::empty,
        )
        .await
        .unwrap();
    let asha = f.add_customer("Asha", None).await;
    f.office
        .dispatch(
            f.office.stores.customers.as_ref(),
            f.tenant,
            asha,
            CustomerCommand::UpdateDetails {
                tenant_id: f.tenant,
                patch: CustomerPatch {
                    birthday: NaiveDate::from_ymd_opt(1994, 3, 12),
                    ..Default::default()
                },
                occurred_at: at(1, 9),
            },
            Customer::empty,
        )
        .await
        .unwrap();

    let report = f.office.run_all(f.tenant, at(12, 6)).await.unwrap();
    assert_eq!(report.greetings_sent, 1);
    assert_eq!(report.coupons_issued, 1);
    assert!(report.summary_sent);

    let sent = f.mailer.sent();
    let greeting = sent.iter().find(|m| m.to == "asha@guest.test").unwrap();
    assert!(greeting.body.contains("Happy birthday"));

    let again = f.office.run_all(f.tenant, at(12, 18)).await.unwrap();
    assert_eq!(again.greetings_sent, 0);
    assert_eq!(again.skipped.len(), 3);
}

/// Reads pass through; every write fails.
struct ReadOnlyStore<K, V>(Arc<dyn TenantStore<K, V>>);

#[async_trait]
impl<K, V> TenantStore<K, V> for ReadOnlyStore<K, V>
where
    K: Send + Sync + 'static,
    V: Send + 'static,
{
    async fn get(&self, tenant_id: TenantId, key: &K) -> Result<Option<V>, StoreError> {
        self.0.get(tenant_id, key).await
    }

    async fn put(
        &self,
        _tenant_id: TenantId,
        _key: K,
        _value: V,
        _expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("read-only".into()))
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<V>, StoreError> {
        self.0.list(tenant_id).await
    }

    async fn tenants(&self) -> Result<Vec<TenantId>, StoreError> {
        self.0.tenants().await
    }
}

#[tokio::test]
async fn a_failing_coupon_does_not_cost_other_greetings() {
    let f = Fixture::new().await;
    let mut loyalty = program();
    loyalty.birthday_coupon = Some(BirthdayCoupon {
        rate: Rate::from_bps(1500),
        valid_days: 14,
    });
    f.office
        .dispatch(
            f.office.stores.accounts.as_ref(),
            f.tenant,
            AggregateId::from(f.tenant),
            AccountCommand::UpdateLoyaltyProgram {
                tenant_id: f.tenant,
                loyalty,
                occurred_at: at(1, 9),
            },
            Account::empty,
        )
        .await
        .unwrap();
    let asha = f.add_customer("Asha", None).await;
    let ravi = f.add_customer("Ravi", None).await;
    for id in [asha, ravi] {
        f.office
            .dispatch(
                f.office.stores.customers.as_ref(),
                f.tenant,
                id,
                CustomerCommand::UpdateDetails {
                    tenant_id: f.tenant,
                    patch: CustomerPatch {
                        birthday: NaiveDate::from_ymd_opt(1990, 3, 12),
                        ..Default::default()
                    },
                    occurred_at: at(1, 9),
                },
                Customer::empty,
            )
            .await
            .unwrap();
    }

    let mut office = f.office.clone();
    office.stores.coupons = Arc::new(ReadOnlyStore(f.office.stores.coupons.clone()));

    let report = office.run_all(f.tenant, at(12, 6)).await.unwrap();
    assert_eq!(report.greetings_sent, 2);
    assert_eq!(report.coupons_issued, 0);
    assert!(report.summary_sent);
    assert!(report.failed.is_empty());

    let greetings: Vec<_> = f
        .mailer
        .sent()
        .into_iter()
        .filter(|m| m.body.contains("Happy birthday"))
        .collect();
    assert_eq!(greetings.len(), 2);
    assert!(greetings.iter().all(|m| !m.body.contains("Use code")));
}

#[tokio::test]
async fn a_code_is_taken_before_its_record_is_written() {
    let f = Fixture::new().await;
    let office = &f.office;
    let spring = UniqueKey::new(KeyKind::CouponCode, "SPRING");

    let coupon = office
        .with_unique_keys(f.tenant, CouponId::generate(), &[], &[spring.clone()], || async {
            // No SPRING coupon is stored yet.
            let rival = office
                .with_unique_keys(f.tenant, CouponId::generate(), &[], &[spring.clone()], || async {
                    Ok(())
                })
                .await;
            assert!(matches!(rival, Err(DispatchError::Conflict(_))));
            Ok(f.add_coupon("SPRING", DiscountRule::Percent(Rate::from_bps(1000))).await)
        })
        .await
        .unwrap();
    assert!(office.find(office.stores.coupons.as_ref(), f.tenant, &coupon).await.is_ok());

    // A failed write gives its claims back.
    let autumn = UniqueKey::new(KeyKind::CouponCode, "AUTUMN");
    let failed = office
        .with_unique_keys(f.tenant, CouponId::generate(), &[], &[autumn.clone()], || async {
            Err::<(), _>(DispatchError::NotFound)
        })
        .await;
    assert_eq!(failed, Err(DispatchError::NotFound));
    office
        .with_unique_keys(f.tenant, CouponId::generate(), &[], &[autumn], || async { Ok(()) })
        .await
        .unwrap();
}

#[tokio::test]
async fn generated_codes_are_claimed_for_their_owner() {
    let f = Fixture::new().await;
    let mut codes = std::collections::HashSet::new();
    for _ in 0..50 {
        let key = f
            .office
            .claim_generated_code(f.tenant, KeyKind::CouponCode, CouponId::generate(), "RW", 8)
            .await
            .unwrap();
        assert!(key.value.starts_with("RW") && key.value.len() == 10);
        let rival = f
            .office
            .stores
            .unique_keys
            .claim(f.tenant, &key, AggregateId::new())
            .await;
        assert!(matches!(rival, Err(StoreError::Conflict(_))));
        assert!(codes.insert(key.value));
    }
}

#[tokio::test]
async fn issued_invoices_send_receipts_and_update_metrics() {
    let f = Fixture::new().await;
    let office = Arc::new(f.office.clone());
    let metrics = Metrics::new().unwrap();
    let listeners = spawn_listeners(office, metrics.clone()).unwrap();

    let asha = f.add_customer("Asha", None).await;
    let mut request = f.sale(vec![f.line(ItemKind::Service, f.massage, 1)]);
    request.customer_id = Some(asha);
    let invoice = f.office.create_invoice(f.tenant, request, at(10, 11)).await.unwrap();

    let mut receipt = None;
    for _ in 0..50 {
        receipt = f
            .mailer
            .sent()
            .into_iter()
            .find(|m| m.subject.contains(invoice.number()));
        if receipt.is_some() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    let receipt = receipt.expect("receipt e-mail");
    assert_eq!(receipt.to, "asha@guest.test");
    assert!(receipt.body.contains("Total: 1180.00"));
    assert!(metrics.render().unwrap().contains("spadesk_invoices_issued_total 1"));

    listeners.shutdown();
}
