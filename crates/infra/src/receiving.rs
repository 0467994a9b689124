//! Purchase orders and stock movements that are not sales.
//!
//! Receiving goods against a purchase order is two writes: the order
//! records the receipt, then each received line becomes a FIFO batch on
//! the product's ledger at the order's outlet and unit cost.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use spadesk_accounts::OutletId;
use spadesk_catalog::{Product, ProductId};
use spadesk_core::{DomainError, DomainResult, Money, TenantId};
use spadesk_inventory::{AdjustStock, ReceiveStock, StockLedger, StockLedgerCommand, StockSource};
use spadesk_parties::VendorId;
use spadesk_purchasing::{
    AddLine, Cancel, CreatePurchaseOrder, PurchaseOrder, PurchaseOrderCommand,
    PurchaseOrderEvent, PurchaseOrderId, ReceiptLine, ReceiveGoods, Submit,
    format_purchase_order_number, purchase_order_sequence_key,
};

use crate::backoffice::Backoffice;
use crate::command_dispatcher::DispatchError;
use crate::store::TenantStore;

/// On-hand view of one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub on_hand: u64,
    pub stock_value: Money,
    pub reorder_level: u32,
    pub outlets: Vec<OutletStock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutletStock {
    pub outlet_id: OutletId,
    pub on_hand: u64,
}

impl StockLevel {
    fn of(
        product: &Product,
        ledger: Option<&StockLedger>,
        outlet: Option<OutletId>,
    ) -> DomainResult<Self> {
        let mut outlets: Vec<OutletStock> = Vec::new();
        if let Some(ledger) = ledger {
            for batch in ledger.batches() {
                if outlet.is_some_and(|o| o != batch.outlet)
                    || outlets.iter().any(|s| s.outlet_id == batch.outlet)
                {
                    continue;
                }
                outlets.push(OutletStock {
                    outlet_id: batch.outlet,
                    on_hand: ledger.on_hand(Some(batch.outlet)),
                });
            }
        }
        let stock_value = match ledger {
            Some(ledger) => ledger.stock_value(outlet)?,
            None => Money::ZERO,
        };
        Ok(Self {
            product_id: product.id_typed(),
            sku: product.sku().to_string(),
            name: product.name().to_string(),
            on_hand: ledger.map(|l| l.on_hand(outlet)).unwrap_or(0),
            stock_value,
            reorder_level: product.reorder_level(),
            outlets,
        })
    }
}

impl Backoffice {
    pub async fn create_purchase_order(
        &self,
        tenant_id: TenantId,
        vendor_id: VendorId,
        outlet_id: OutletId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOrder, DispatchError> {
        let vendor = self.find(self.stores.vendors.as_ref(), tenant_id, &vendor_id).await?;
        if !vendor.can_transact() {
            return Err(DomainError::invariant("vendor is suspended").into());
        }
        self.find(self.stores.outlets.as_ref(), tenant_id, &outlet_id)
            .await?
            .ensure_active(tenant_id)?;

        let seq = self
            .stores
            .sequences
            .next(tenant_id, &purchase_order_sequence_key(now))
            .await?;
        let order_id = PurchaseOrderId::generate();
        self.dispatch(
            self.stores.purchase_orders.as_ref(),
            tenant_id,
            order_id,
            PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                number: format_purchase_order_number(now, seq),
                vendor_id,
                outlet_id,
                notes,
                occurred_at: now,
            }),
            PurchaseOrder::empty,
        )
        .await
    }

    pub async fn add_purchase_order_line(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        product_id: ProductId,
        quantity: u32,
        unit_cost: Money,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOrder, DispatchError> {
        self.find(self.stores.products.as_ref(), tenant_id, &product_id)
            .await
            .map_err(|err| match err {
                DispatchError::NotFound => DispatchError::Validation("unknown product".to_string()),
                other => other,
            })?;
        self.purchase_order_command(
            tenant_id,
            order_id,
            PurchaseOrderCommand::AddLine(AddLine {
                tenant_id,
                order_id,
                product_id,
                quantity,
                unit_cost,
                occurred_at: now,
            }),
        )
        .await
    }

    pub async fn submit_purchase_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOrder, DispatchError> {
        self.purchase_order_command(
            tenant_id,
            order_id,
            PurchaseOrderCommand::Submit(Submit {
                tenant_id,
                order_id,
                occurred_at: now,
            }),
        )
        .await
    }

    pub async fn cancel_purchase_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOrder, DispatchError> {
        self.purchase_order_command(
            tenant_id,
            order_id,
            PurchaseOrderCommand::Cancel(Cancel {
                tenant_id,
                order_id,
                reason,
                occurred_at: now,
            }),
        )
        .await
    }

    /// Record a receipt and book each received line as a FIFO batch.
    pub async fn receive_purchase_order(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        lines: Vec<ReceiptLine>,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOrder, DispatchError> {
        self.find(self.stores.purchase_orders.as_ref(), tenant_id, &order_id)
            .await?;
        let dispatched = self
            .dispatcher
            .dispatch(
                self.stores.purchase_orders.as_ref(),
                tenant_id,
                order_id,
                PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                    tenant_id,
                    order_id,
                    lines,
                    occurred_at: now,
                }),
                PurchaseOrder::empty,
            )
            .await?;

        for event in &dispatched.events {
            let PurchaseOrderEvent::GoodsReceived(received) = event else {
                continue;
            };
            for line in &received.lines {
                self.dispatcher
                    .dispatch_retrying(
                        self.stores.stock.as_ref(),
                        tenant_id,
                        line.product_id,
                        StockLedgerCommand::ReceiveStock(ReceiveStock {
                            tenant_id,
                            outlet: received.outlet_id,
                            quantity: line.quantity,
                            unit_cost: line.unit_cost,
                            source: StockSource::PurchaseOrder {
                                order_id: order_id.aggregate_id(),
                                line_no: line.line_no,
                            },
                            occurred_at: now,
                        }),
                        StockLedger::empty,
                    )
                    .await?;
            }
            info!(
                order = dispatched.aggregate.number(),
                lines = received.lines.len(),
                "goods received"
            );
        }
        Ok(dispatched.aggregate)
    }

    async fn purchase_order_command(
        &self,
        tenant_id: TenantId,
        order_id: PurchaseOrderId,
        command: PurchaseOrderCommand,
    ) -> Result<PurchaseOrder, DispatchError> {
        self.find(self.stores.purchase_orders.as_ref(), tenant_id, &order_id)
            .await?;
        self.dispatch(
            self.stores.purchase_orders.as_ref(),
            tenant_id,
            order_id,
            command,
            PurchaseOrder::empty,
        )
        .await
    }

    /// A product that can carry stock movements at an active outlet.
    async fn stocked_product(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
    ) -> Result<Product, DispatchError> {
        let product = self
            .find(self.stores.products.as_ref(), tenant_id, &product_id)
            .await?;
        if !product.track_inventory() {
            return Err(DomainError::validation(format!(
                "product '{}' does not track inventory",
                product.sku()
            ))
            .into());
        }
        self.find(self.stores.outlets.as_ref(), tenant_id, &outlet_id)
            .await?
            .ensure_active(tenant_id)?;
        Ok(product)
    }

    /// Receive stock outside a purchase order.
    pub async fn receive_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
        quantity: u32,
        unit_cost: Money,
        now: DateTime<Utc>,
    ) -> Result<StockLevel, DispatchError> {
        let product = self.stocked_product(tenant_id, product_id, outlet_id).await?;
        let ledger = self
            .dispatcher
            .dispatch_retrying(
                self.stores.stock.as_ref(),
                tenant_id,
                product_id,
                StockLedgerCommand::ReceiveStock(ReceiveStock {
                    tenant_id,
                    outlet: outlet_id,
                    quantity,
                    unit_cost,
                    source: StockSource::Manual,
                    occurred_at: now,
                }),
                StockLedger::empty,
            )
            .await?
            .aggregate;
        Ok(StockLevel::of(&product, Some(&ledger), None)?)
    }

    /// Write stock off (negative delta) or add found stock (positive).
    pub async fn adjust_stock(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet_id: OutletId,
        delta: i64,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<StockLevel, DispatchError> {
        let product = self.stocked_product(tenant_id, product_id, outlet_id).await?;
        let ledger = self
            .dispatcher
            .dispatch_retrying(
                self.stores.stock.as_ref(),
                tenant_id,
                product_id,
                StockLedgerCommand::AdjustStock(AdjustStock {
                    tenant_id,
                    outlet: outlet_id,
                    delta,
                    reason,
                    occurred_at: now,
                }),
                StockLedger::empty,
            )
            .await?
            .aggregate;
        Ok(StockLevel::of(&product, Some(&ledger), None)?)
    }

    pub async fn stock_level(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        outlet: Option<OutletId>,
    ) -> Result<StockLevel, DispatchError> {
        let product = self
            .find(self.stores.products.as_ref(), tenant_id, &product_id)
            .await?;
        let ledger = self.stores.stock.get(tenant_id, &product_id).await?;
        Ok(StockLevel::of(&product, ledger.as_ref(), outlet)?)
    }

    /// Tracked products whose on-hand is at or below their reorder level.
    pub async fn low_stock(
        &self,
        tenant_id: TenantId,
        outlet: Option<OutletId>,
    ) -> Result<Vec<StockLevel>, DispatchError> {
        let mut low = Vec::new();
        for product in self.list(self.stores.products.as_ref(), tenant_id).await? {
            if !product.track_inventory() {
                continue;
            }
            let ledger = self.stores.stock.get(tenant_id, &product.id_typed()).await?;
            let level = StockLevel::of(&product, ledger.as_ref(), outlet)?;
            if level.on_hand <= u64::from(level.reorder_level) {
                low.push(level);
            }
        }
        Ok(low)
    }
}
