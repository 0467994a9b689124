//! Purchasing domain module (purchase orders).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod order;

pub use order::{
    AddLine, Cancel, CreatePurchaseOrder, GoodsReceived, LineItem, PurchaseOrder,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderId, PurchaseOrderStatus, ReceiptLine,
    ReceiveGoods, ReceivedLine, Submit, format_purchase_order_number,
    purchase_order_sequence_key,
};
