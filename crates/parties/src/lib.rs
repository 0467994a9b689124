//! Parties domain module: customers, employees and vendors.
//!
//! Pure deterministic domain logic (no IO, no HTTP, no storage).

pub mod customer;
pub mod employee;
pub mod vendor;

pub use customer::{
    Customer, CustomerCommand, CustomerEvent, CustomerId, CustomerPatch, Gender, Settlement,
};
pub use employee::{Employee, EmployeeCommand, EmployeeEvent, EmployeeId, EmployeePatch};
pub use vendor::{ContactInfo, Vendor, VendorCommand, VendorEvent, VendorId, VendorStatus};
