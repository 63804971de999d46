//! Reference quota server for payment-gated access.
//!
//! Payment headers are redeemed through a pull-payment ledger settling in an
//! in-process ERC-3009 token; each redeemed payment opens a quota-bound
//! subscription that protected calls are charged against.
//!
//! # Modules
//!
//! - [`handlers`] - Axum route handlers and router builder
//! - [`state`] - Shared ledger and subscription state, payment acceptance
//! - [`error`] - Server error types and their HTTP mapping
//! - [`config`] - Server configuration with environment variable expansion

pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

pub use handlers::router;
pub use state::{AppState, SharedState};
