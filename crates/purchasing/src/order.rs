use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use spadesk_accounts::OutletId;
use spadesk_catalog::ProductId;
use spadesk_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Money, TenantId, ensure_tenant,
};
use spadesk_events::Event;
use spadesk_parties::VendorId;

spadesk_core::typed_id!(
    /// Purchase order identifier (tenant-scoped via `tenant_id` fields in events/commands).
    PurchaseOrderId,
    "purchase order id"
);

/// Sequence key purchase order numbers are drawn from.
pub fn purchase_order_sequence_key(at: DateTime<Utc>) -> String {
    format!("purchase_order:{}", at.year())
}

/// `PO-{YYYY}-{seq:05}`.
pub fn format_purchase_order_number(at: DateTime<Utc>, seq: u64) -> String {
    format!("PO-{}-{seq:05}", at.year())
}

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Submitted,
    PartiallyReceived,
    Received,
    Cancelled,
}

impl core::str::FromStr for PurchaseOrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "submitted" => Ok(Self::Submitted),
            "partially_received" => Ok(Self::PartiallyReceived),
            "received" => Ok(Self::Received),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown purchase order status '{other}'"
            ))),
        }
    }
}

/// Purchase order line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_cost: Money,
    pub received: u32,
}

impl LineItem {
    pub fn outstanding(&self) -> u32 {
        self.quantity.saturating_sub(self.received)
    }
}

/// One line's share of a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub line_no: u32,
    pub quantity: u32,
}

/// A received quantity with the line's product and cost, ready to book as stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_cost: Money,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    tenant_id: Option<TenantId>,
    number: String,
    vendor_id: Option<VendorId>,
    outlet_id: Option<OutletId>,
    status: PurchaseOrderStatus,
    lines: Vec<LineItem>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            tenant_id: None,
            number: String::new(),
            vendor_id: None,
            outlet_id: None,
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            notes: None,
            created_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
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

    pub fn vendor_id(&self) -> Option<VendorId> {
        self.vendor_id
    }

    pub fn outlet_id(&self) -> Option<OutletId> {
        self.outlet_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn total_cost(&self) -> DomainResult<Money> {
        self.lines.iter().try_fold(Money::ZERO, |acc, l| {
            l.unit_cost
                .checked_mul(l.quantity)
                .and_then(|value| acc.checked_add(value))
                .ok_or_else(|| DomainError::invariant("purchase order total overflow"))
        })
    }

    fn has_receipts(&self) -> bool {
        self.lines.iter().any(|l| l.received > 0)
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePurchaseOrder {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub vendor_id: VendorId,
    pub outlet_id: OutletId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine (only allowed in Draft).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submit {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReceiveGoods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub lines: Vec<ReceiptLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    CreatePurchaseOrder(CreatePurchaseOrder),
    AddLine(AddLine),
    Submit(Submit),
    ReceiveGoods(ReceiveGoods),
    Cancel(Cancel),
}

/// Event: PurchaseOrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCreated {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub number: String,
    pub vendor_id: VendorId,
    pub outlet_id: OutletId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderLineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLineAdded {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_cost: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSubmitted {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries product and unit cost per line so the receiving workflow can
/// book each line as a FIFO batch at the order's outlet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub outlet_id: OutletId,
    pub lines: Vec<ReceivedLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCancelled {
    pub tenant_id: TenantId,
    pub order_id: PurchaseOrderId,
    pub reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    PurchaseOrderCreated(PurchaseOrderCreated),
    PurchaseOrderLineAdded(PurchaseOrderLineAdded),
    PurchaseOrderSubmitted(PurchaseOrderSubmitted),
    GoodsReceived(GoodsReceived),
    PurchaseOrderCancelled(PurchaseOrderCancelled),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(_) => "purchasing.order.created",
            PurchaseOrderEvent::PurchaseOrderLineAdded(_) => "purchasing.order.line_added",
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => "purchasing.order.submitted",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => "purchasing.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderSubmitted(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
            PurchaseOrderEvent::PurchaseOrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::PurchaseOrderCreated(e) => {
                self.id = e.order_id;
                self.tenant_id = Some(e.tenant_id);
                self.number = e.number.clone();
                self.vendor_id = Some(e.vendor_id);
                self.outlet_id = Some(e.outlet_id);
                self.notes = e.notes.clone();
                self.status = PurchaseOrderStatus::Draft;
                self.lines.clear();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            PurchaseOrderEvent::PurchaseOrderLineAdded(e) => {
                self.lines.push(LineItem {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity: e.quantity,
                    unit_cost: e.unit_cost,
                    received: 0,
                });
            }
            PurchaseOrderEvent::PurchaseOrderSubmitted(_) => {
                self.status = PurchaseOrderStatus::Submitted;
            }
            PurchaseOrderEvent::GoodsReceived(e) => {
                for received in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == received.line_no) {
                        line.received += received.quantity;
                    }
                }
                self.status = if self.lines.iter().all(|l| l.outstanding() == 0) {
                    PurchaseOrderStatus::Received
                } else {
                    PurchaseOrderStatus::PartiallyReceived
                };
            }
            PurchaseOrderEvent::PurchaseOrderCancelled(_) => {
                self.status = PurchaseOrderStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::CreatePurchaseOrder(cmd) => self.handle_create(cmd),
            PurchaseOrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            PurchaseOrderCommand::Submit(cmd) => self.handle_submit(cmd),
            PurchaseOrderCommand::ReceiveGoods(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_existing(&self, tenant_id: TenantId, order_id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        ensure_tenant(self.tenant_id, tenant_id)?;
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(
        &self,
        cmd: &CreatePurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.number.trim().is_empty() {
            return Err(DomainError::validation("purchase order number is required"));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCreated(
            PurchaseOrderCreated {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                number: cmd.number.clone(),
                vendor_id: cmd.vendor_id,
                outlet_id: cmd.outlet_id,
                notes: cmd.notes.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "lines can only be added to draft purchase orders",
            ));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        cmd.unit_cost.ensure_non_negative("unit_cost")?;
        cmd.unit_cost
            .checked_mul(cmd.quantity)
            .and_then(|value| self.total_cost().ok()?.checked_add(value))
            .ok_or_else(|| DomainError::invariant("purchase order total overflow"))?;

        let next_line_no = (self.lines.len() as u32) + 1;
        Ok(vec![PurchaseOrderEvent::PurchaseOrderLineAdded(
            PurchaseOrderLineAdded {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                line_no: next_line_no,
                product_id: cmd.product_id,
                quantity: cmd.quantity,
                unit_cost: cmd.unit_cost,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_submit(&self, cmd: &Submit) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invariant(
                "only draft purchase orders can be submitted",
            ));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot submit purchase order without lines",
            ));
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderSubmitted(
            PurchaseOrderSubmitted {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_receive(
        &self,
        cmd: &ReceiveGoods,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        if !matches!(
            self.status,
            PurchaseOrderStatus::Submitted | PurchaseOrderStatus::PartiallyReceived
        ) {
            return Err(DomainError::invariant(
                "goods can only be received on submitted purchase orders",
            ));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("at least one receipt line is required"));
        }
        let outlet_id = self
            .outlet_id
            .ok_or_else(|| DomainError::invariant("outlet must be set"))?;

        let mut received = Vec::with_capacity(cmd.lines.len());
        for receipt in &cmd.lines {
            let line = self
                .lines
                .iter()
                .find(|l| l.line_no == receipt.line_no)
                .ok_or_else(|| {
                    DomainError::validation(format!("line {} does not exist", receipt.line_no))
                })?;
            if receipt.quantity == 0 {
                return Err(DomainError::validation(format!(
                    "line {}: quantity must be positive",
                    receipt.line_no
                )));
            }
            let already: u32 = received
                .iter()
                .filter(|r: &&ReceivedLine| r.line_no == line.line_no)
                .map(|r| r.quantity)
                .sum();
            if already + receipt.quantity > line.outstanding() {
                return Err(DomainError::invariant(format!(
                    "line {}: cannot receive {} (outstanding {})",
                    line.line_no,
                    already + receipt.quantity,
                    line.outstanding()
                )));
            }
            received.push(ReceivedLine {
                line_no: line.line_no,
                product_id: line.product_id,
                quantity: receipt.quantity,
                unit_cost: line.unit_cost,
            });
        }

        Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
            tenant_id: cmd.tenant_id,
            order_id: cmd.order_id,
            outlet_id,
            lines: received,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_existing(cmd.tenant_id, cmd.order_id)?;

        match self.status {
            PurchaseOrderStatus::Cancelled => {
                return Err(DomainError::conflict("purchase order is already cancelled"));
            }
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Submitted if !self.has_receipts() => {}
            _ => {
                return Err(DomainError::invariant(
                    "cannot cancel a purchase order after goods were received",
                ));
            }
        }

        Ok(vec![PurchaseOrderEvent::PurchaseOrderCancelled(
            PurchaseOrderCancelled {
                tenant_id: cmd.tenant_id,
                order_id: cmd.order_id,
                reason: cmd.reason.clone(),
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    struct Fixture {
        tenant_id: TenantId,
        order: PurchaseOrder,
    }

    impl Fixture {
        fn draft() -> Self {
            let tenant_id = TenantId::new();
            let order_id = PurchaseOrderId::generate();
            let mut f = Self {
                tenant_id,
                order: PurchaseOrder::empty(order_id),
            };
            f.run(PurchaseOrderCommand::CreatePurchaseOrder(CreatePurchaseOrder {
                tenant_id,
                order_id,
                number: "PO-2026-00001".into(),
                vendor_id: VendorId::generate(),
                outlet_id: OutletId::generate(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
            f
        }

        fn run(&mut self, cmd: PurchaseOrderCommand) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            let events = self.order.handle(&cmd)?;
            for e in &events {
                self.order.apply(e);
            }
            Ok(events)
        }

        fn add_line(&mut self, quantity: u32, unit_cost: i64) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            self.run(PurchaseOrderCommand::AddLine(AddLine {
                tenant_id: self.tenant_id,
                order_id: self.order.id_typed(),
                product_id: ProductId::generate(),
                quantity,
                unit_cost: Money::from_minor(unit_cost),
                occurred_at: test_time(),
            }))
        }

        fn submit(&mut self) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            self.run(PurchaseOrderCommand::Submit(Submit {
                tenant_id: self.tenant_id,
                order_id: self.order.id_typed(),
                occurred_at: test_time(),
            }))
        }

        fn receive(&mut self, lines: &[(u32, u32)]) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            self.run(PurchaseOrderCommand::ReceiveGoods(ReceiveGoods {
                tenant_id: self.tenant_id,
                order_id: self.order.id_typed(),
                lines: lines
                    .iter()
                    .map(|(line_no, quantity)| ReceiptLine {
                        line_no: *line_no,
                        quantity: *quantity,
                    })
                    .collect(),
                occurred_at: test_time(),
            }))
        }

        fn cancel(&mut self) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
            self.run(PurchaseOrderCommand::Cancel(Cancel {
                tenant_id: self.tenant_id,
                order_id: self.order.id_typed(),
                reason: None,
                occurred_at: test_time(),
            }))
        }
    }

    #[test]
    fn numbers_are_yearly() {
        let at = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(format_purchase_order_number(at, 42), "PO-2026-00042");
        assert_eq!(purchase_order_sequence_key(at), "purchase_order:2026");
    }

    #[test]
    fn cannot_submit_without_lines() {
        let mut f = Fixture::draft();
        let err = f.submit().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn lines_only_in_draft() {
        let mut f = Fixture::draft();
        f.add_line(10, 250).unwrap();
        f.submit().unwrap();
        assert!(matches!(f.add_line(1, 1), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn partial_then_full_receipt() {
        let mut f = Fixture::draft();
        f.add_line(10, 250).unwrap();
        f.add_line(4, 1_000).unwrap();
        f.submit().unwrap();

        let events = f.receive(&[(1, 6)]).unwrap();
        match &events[0] {
            PurchaseOrderEvent::GoodsReceived(e) => {
                assert_eq!(e.lines.len(), 1);
                assert_eq!(e.lines[0].unit_cost, Money::from_minor(250));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(f.order.status(), PurchaseOrderStatus::PartiallyReceived);

        assert!(matches!(f.receive(&[(1, 5)]), Err(DomainError::InvariantViolation(_))));
        assert!(f.receive(&[(1, 2), (1, 3)]).is_err());

        f.receive(&[(1, 4), (2, 4)]).unwrap();
        assert_eq!(f.order.status(), PurchaseOrderStatus::Received);
        assert_eq!(f.order.total_cost(), Ok(Money::from_minor(6_500)));
    }

    #[test]
    fn lines_that_overflow_the_order_total_are_rejected() {
        let mut f = Fixture::draft();
        f.add_line(2, i64::MAX / 4).unwrap();
        assert_eq!(
            f.add_line(3, i64::MAX / 4),
            Err(DomainError::invariant("purchase order total overflow"))
        );
        assert_eq!(f.order.total_cost(), Ok(Money::from_minor(i64::MAX / 4 * 2)));
    }

    #[test]
    fn cannot_receive_before_submit() {
        let mut f = Fixture::draft();
        f.add_line(1, 100).unwrap();
        assert!(f.receive(&[(1, 1)]).is_err());
    }

    #[test]
    fn cancel_only_before_any_receipt() {
        let mut f = Fixture::draft();
        f.add_line(2, 100).unwrap();
        f.submit().unwrap();
        f.cancel().unwrap();
        assert_eq!(f.order.status(), PurchaseOrderStatus::Cancelled);
        assert!(matches!(f.cancel(), Err(DomainError::Conflict(_))));

        let mut g = Fixture::draft();
        g.add_line(2, 100).unwrap();
        g.submit().unwrap();
        g.receive(&[(1, 1)]).unwrap();
        assert!(matches!(g.cancel(), Err(DomainError::InvariantViolation(_))));
    }

    #[test]
    fn other_tenant_rejected() {
        let mut f = Fixture::draft();
        f.tenant_id = TenantId::new();
        assert!(f.add_line(1, 1).is_err());
    }
}
