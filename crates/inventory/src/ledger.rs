use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use spadesk_accounts::OutletId;
use spadesk_catalog::ProductId;
use spadesk_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, DomainResult, Money, TenantId,
    ensure_tenant,
};
use spadesk_events::Event;

/// Where a batch came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockSource {
    PurchaseOrder { order_id: AggregateId, line_no: u32 },
    Manual,
    Adjustment { reason: String },
}

/// A quantity received at one outlet at one unit cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub batch_no: u32,
    pub outlet: OutletId,
    pub received_at: DateTime<Utc>,
    pub quantity_received: u32,
    pub quantity_remaining: u32,
    pub unit_cost: Money,
    pub source: StockSource,
}

/// Quantity taken from one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPart {
    pub batch_no: u32,
    pub quantity: u32,
    pub unit_cost: Money,
}

/// Stock consumed for a sale, remembered so it can be put back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub reference: String,
    pub outlet: OutletId,
    pub parts: Vec<AllocationPart>,
    pub restored: bool,
}

impl Allocation {
    pub fn quantity(&self) -> u32 {
        self.parts.iter().map(|p| p.quantity).sum()
    }

    /// FIFO cost of goods for this allocation.
    pub fn cost(&self) -> DomainResult<Money> {
        total_value(self.parts.iter().map(|p| (p.unit_cost, p.quantity)))
    }
}

fn value_overflow() -> DomainError {
    DomainError::invariant("stock value overflow")
}

fn total_value(mut items: impl Iterator<Item = (Money, u32)>) -> DomainResult<Money> {
    items.try_fold(Money::ZERO, |acc, (unit_cost, quantity)| {
        unit_cost
            .checked_mul(quantity)
            .and_then(|value| acc.checked_add(value))
            .ok_or_else(value_overflow)
    })
}

/// Aggregate root: the stock ledger of one product across outlets.
///
/// # Invariants
/// - `quantity_remaining <= quantity_received` for every batch.
/// - Allocation never goes partial: it either covers the full quantity from
///   the outlet's batches or records nothing.
/// - Restoring an allocation returns each part to the batch it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLedger {
    id: ProductId,
    tenant_id: Option<TenantId>,
    batches: Vec<Batch>,
    allocations: Vec<Allocation>,
    version: u64,
}

impl StockLedger {
    /// A ledger with no history. Ledgers come into existence with their
    /// first receipt, so there is no separate create command.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            tenant_id: None,
            batches: Vec::new(),
            allocations: Vec::new(),
            version: 0,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// Quantity available at `outlet`, or across all outlets for `None`.
    pub fn on_hand(&self, outlet: Option<OutletId>) -> u64 {
        self.batches
            .iter()
            .filter(|b| outlet.is_none_or(|o| b.outlet == o))
            .map(|b| u64::from(b.quantity_remaining))
            .sum()
    }

    /// Value of remaining stock at batch cost.
    pub fn stock_value(&self, outlet: Option<OutletId>) -> DomainResult<Money> {
        total_value(
            self.batches
                .iter()
                .filter(|b| outlet.is_none_or(|o| b.outlet == o))
                .map(|b| (b.unit_cost, b.quantity_remaining)),
        )
    }

    /// Fails when a new batch would push the ledger's value out of range.
    fn ensure_value_fits(&self, unit_cost: Money, quantity: u32) -> DomainResult<()> {
        let added = total_value([(unit_cost, quantity)].into_iter())?;
        self.stock_value(None)?
            .checked_add(added)
            .map(|_| ())
            .ok_or_else(value_overflow)
    }

    pub fn allocation(&self, reference: &str) -> Option<&Allocation> {
        self.allocations.iter().find(|a| a.reference == reference)
    }

    /// Unit cost of the most recently received batch.
    pub fn latest_unit_cost(&self) -> Money {
        self.batches
            .iter()
            .max_by_key(|b| (b.received_at, b.batch_no))
            .map(|b| b.unit_cost)
            .unwrap_or(Money::ZERO)
    }

    /// Plan a FIFO take of `quantity` at `outlet` without mutating state.
    fn plan_fifo(&self, outlet: OutletId, quantity: u32) -> DomainResult<Vec<AllocationPart>> {
        let available = self.on_hand(Some(outlet));
        if available < u64::from(quantity) {
            return Err(DomainError::invariant(format!(
                "insufficient stock: requested {quantity}, available {available}"
            )));
        }

        let mut candidates: Vec<&Batch> = self
            .batches
            .iter()
            .filter(|b| b.outlet == outlet && b.quantity_remaining > 0)
            .collect();
        candidates.sort_by_key(|b| (b.received_at, b.batch_no));

        let mut remaining = quantity;
        let mut parts = Vec::new();
        for batch in candidates {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.quantity_remaining);
            parts.push(AllocationPart {
                batch_no: batch.batch_no,
                quantity: take,
                unit_cost: batch.unit_cost,
            });
            remaining -= take;
        }
        Ok(parts)
    }

    fn next_batch_no(&self) -> u32 {
        self.batches.iter().map(|b| b.batch_no).max().unwrap_or(0) + 1
    }

    fn take(&mut self, parts: &[AllocationPart]) {
        for part in parts {
            if let Some(b) = self.batches.iter_mut().find(|b| b.batch_no == part.batch_no) {
                b.quantity_remaining = b.quantity_remaining.saturating_sub(part.quantity);
            }
        }
    }

    fn put_back(&mut self, parts: &[AllocationPart]) {
        for part in parts {
            if let Some(b) = self.batches.iter_mut().find(|b| b.batch_no == part.batch_no) {
                b.quantity_remaining = (b.quantity_remaining + part.quantity).min(b.quantity_received);
            }
        }
    }
}

impl AggregateRoot for StockLedger {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub tenant_id: TenantId,
    pub outlet: OutletId,
    pub quantity: u32,
    pub unit_cost: Money,
    pub source: StockSource,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateStock {
    pub tenant_id: TenantId,
    pub outlet: OutletId,
    pub quantity: u32,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub tenant_id: TenantId,
    pub outlet: OutletId,
    pub delta: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockLedgerCommand {
    ReceiveStock(ReceiveStock),
    AllocateStock(AllocateStock),
    RestoreAllocation {
        tenant_id: TenantId,
        reference: String,
        occurred_at: DateTime<Utc>,
    },
    AdjustStock(AdjustStock),
}

// ─────────────────────────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockLedgerEvent {
    StockReceived {
        tenant_id: TenantId,
        batch: Batch,
    },
    StockAllocated {
        allocation: Allocation,
        occurred_at: DateTime<Utc>,
    },
    AllocationRestored {
        reference: String,
        occurred_at: DateTime<Utc>,
    },
    StockWrittenOff {
        outlet: OutletId,
        parts: Vec<AllocationPart>,
        reason: String,
        occurred_at: DateTime<Utc>,
    },
}

impl Event for StockLedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockLedgerEvent::StockReceived { .. } => "inventory.stock.received",
            StockLedgerEvent::StockAllocated { .. } => "inventory.stock.allocated",
            StockLedgerEvent::AllocationRestored { .. } => "inventory.stock.allocation_restored",
            StockLedgerEvent::StockWrittenOff { .. } => "inventory.stock.written_off",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockLedgerEvent::StockReceived { batch, .. } => batch.received_at,
            StockLedgerEvent::StockAllocated { occurred_at, .. }
            | StockLedgerEvent::AllocationRestored { occurred_at, .. }
            | StockLedgerEvent::StockWrittenOff { occurred_at, .. } => *occurred_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate Implementation
// ─────────────────────────────────────────────────────────────────────────────

impl Aggregate for StockLedger {
    type Command = StockLedgerCommand;
    type Event = StockLedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockLedgerEvent::StockReceived { tenant_id, batch } => {
                self.tenant_id.get_or_insert(*tenant_id);
                self.batches.push(batch.clone());
            }
            StockLedgerEvent::StockAllocated { allocation, .. } => {
                self.take(&allocation.parts);
                self.allocations.push(allocation.clone());
            }
            StockLedgerEvent::AllocationRestored { reference, .. } => {
                let parts = self
                    .allocations
                    .iter_mut()
                    .find(|a| a.reference == *reference && !a.restored)
                    .map(|a| {
                        a.restored = true;
                        a.parts.clone()
                    });
                if let Some(parts) = parts {
                    self.put_back(&parts);
                }
            }
            StockLedgerEvent::StockWrittenOff { parts, .. } => self.take(parts),
        }
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            StockLedgerCommand::ReceiveStock(cmd) => self.handle_receive(cmd),
            StockLedgerCommand::AllocateStock(cmd) => self.handle_allocate(cmd),
            StockLedgerCommand::RestoreAllocation {
                tenant_id,
                reference,
                occurred_at,
            } => {
                ensure_tenant(self.tenant_id, *tenant_id)?;
                match self.allocation(reference) {
                    Some(a) if !a.restored => Ok(vec![StockLedgerEvent::AllocationRestored {
                        reference: reference.clone(),
                        occurred_at: *occurred_at,
                    }]),
                    _ => Ok(vec![]),
                }
            }
            StockLedgerCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
        }
    }
}

impl StockLedger {
    fn handle_receive(&self, cmd: &ReceiveStock) -> Result<Vec<StockLedgerEvent>, DomainError> {
        ensure_tenant(self.tenant_id, cmd.tenant_id)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        cmd.unit_cost.ensure_non_negative("unit_cost")?;
        self.ensure_value_fits(cmd.unit_cost, cmd.quantity)?;

        Ok(vec![StockLedgerEvent::StockReceived {
            tenant_id: cmd.tenant_id,
            batch: Batch {
                batch_no: self.next_batch_no(),
                outlet: cmd.outlet,
                received_at: cmd.occurred_at,
                quantity_received: cmd.quantity,
                quantity_remaining: cmd.quantity,
                unit_cost: cmd.unit_cost,
                source: cmd.source.clone(),
            },
        }])
    }

    fn handle_allocate(&self, cmd: &AllocateStock) -> Result<Vec<StockLedgerEvent>, DomainError> {
        ensure_tenant(self.tenant_id, cmd.tenant_id)?;
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.reference.trim().is_empty() {
            return Err(DomainError::validation("reference is required"));
        }
        if self.allocation(&cmd.reference).is_some() {
            return Err(DomainError::conflict(format!(
                "stock already allocated for {}",
                cmd.reference
            )));
        }

        let parts = self.plan_fifo(cmd.outlet, cmd.quantity)?;
        Ok(vec![StockLedgerEvent::StockAllocated {
            allocation: Allocation {
                reference: cmd.reference.clone(),
                outlet: cmd.outlet,
                parts,
                restored: false,
            },
            occurred_at: cmd.occurred_at,
        }])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<StockLedgerEvent>, DomainError> {
        ensure_tenant(self.tenant_id, cmd.tenant_id)?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason is required"));
        }
        let magnitude = u32::try_from(cmd.delta.unsigned_abs())
            .map_err(|_| DomainError::validation("delta is out of range"))?;

        match cmd.delta.signum() {
            0 => Err(DomainError::validation("delta must not be zero")),
            1 => {
                let unit_cost = self.latest_unit_cost();
                self.ensure_value_fits(unit_cost, magnitude)?;
                Ok(vec![StockLedgerEvent::StockReceived {
                    tenant_id: cmd.tenant_id,
                    batch: Batch {
                        batch_no: self.next_batch_no(),
                        outlet: cmd.outlet,
                        received_at: cmd.occurred_at,
                        quantity_received: magnitude,
                        quantity_remaining: magnitude,
                        unit_cost,
                        source: StockSource::Adjustment {
                            reason: cmd.reason.trim().to_string(),
                        },
                    },
                }])
            }
            _ => Ok(vec![StockLedgerEvent::StockWrittenOff {
                outlet: cmd.outlet,
                parts: self.plan_fifo(cmd.outlet, magnitude)?,
                reason: cmd.reason.trim().to_string(),
                occurred_at: cmd.occurred_at,
            }]),
        }
    }
}
