//! Invoicing domain module.
//!
//! This crate contains the pricing engine, the invoice aggregate, invoice
//! numbering and sales reports, implemented purely as deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod invoice;
pub mod numbering;
pub mod pricing;
pub mod report;

pub use invoice::{
    Invoice, InvoiceCommand, InvoiceEvent, InvoiceId, InvoiceIssued, InvoiceStatus,
    InvoiceVoided, IssueInvoice, Payment, PaymentInput, PaymentMode, PaymentRegistered,
    RegisterPayment, StockAllocationRef, VoidInvoice,
};
pub use numbering::{format_invoice_number, invoice_sequence_key};
pub use pricing::{
    CouponOffer, LineDiscount, LoyaltyRequest, PricedInvoice, PricedLine, PricingLine,
    PricingRequest, TenderRequest, MAX_LINE_QUANTITY, price,
};
pub use report::{
    EmployeePerformance, ReportFilter, SalesSummary, TopItem, employee_performance,
    sales_summary, top_items,
};
