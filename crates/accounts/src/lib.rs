//! `spadesk-accounts`: the tenant's business account and its outlets.

pub mod account;
pub mod outlet;
pub mod settings;

pub use account::{Account, AccountCommand, AccountEvent, AccountProfile};
pub use outlet::{Outlet, OutletCommand, OutletEvent, OutletId};
pub use settings::{BirthdayCoupon, LoyaltyProgram, NumberingPolicy, SequenceReset, TaxSettings};
