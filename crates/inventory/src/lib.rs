//! Inventory domain module: per-product stock ledgers with FIFO costing.
//!
//! Pure deterministic domain logic (no IO, no HTTP, no storage).

pub mod ledger;

pub use ledger::{
    AdjustStock, AllocateStock, Allocation, AllocationPart, Batch, ReceiveStock, StockLedger,
    StockLedgerCommand, StockLedgerEvent, StockSource,
};
