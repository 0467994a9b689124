use axum::Router;

pub mod account;
pub mod auth;
pub mod common;
pub mod coupons;
pub mod customers;
pub mod employees;
pub mod gift_cards;
pub mod inventory;
pub mod invoices;
pub mod jobs;
pub mod outlets;
pub mod products;
pub mod purchase_orders;
pub mod reports;
pub mod rewards;
pub mod services;
pub mod system;
pub mod users;
pub mod vendors;

/// Endpoints reachable without a token.
pub fn public_router() -> Router {
    auth::public_router()
}

/// Router for all authenticated (tenant-scoped) endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/account", account::router())
        .nest("/users", users::router())
        .nest("/outlets", outlets::router())
        .nest("/customers", customers::router())
        .nest("/employees", employees::router())
        .nest("/vendors", vendors::router())
        .nest("/services", services::router())
        .nest("/products", products::router())
        .nest("/inventory", inventory::router())
        .nest("/coupons", coupons::router())
        .nest("/gift-cards", gift_cards::router())
        .nest("/rewards", rewards::router())
        .nest("/invoices", invoices::router())
        .nest("/purchase-orders", purchase_orders::router())
        .nest("/reports", reports::router())
        .nest("/jobs", jobs::router())
}
