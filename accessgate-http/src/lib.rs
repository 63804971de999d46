//! HTTP boundary of the quota server.
//!
//! Wire types shared by the server and its clients, and (feature-gated) a
//! reqwest client whose responses are validated against a closed schema
//! before they reach the caller.
//!
//! # Modules
//!
//! - [`constants`] - Route paths and error codes
//! - [`types`] - Request bodies, response envelopes
//! - `error` - Client errors and their retry classification (feature: `client`)
//! - `client` - Quota server client (feature: `client`)
//! - `protected` - Protected endpoints for the retry coordinator (feature: `client`)

pub mod constants;
pub mod types;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod error;
#[cfg(feature = "client")]
pub mod protected;

#[cfg(feature = "client")]
pub use client::SubscriptionClient;
#[cfg(feature = "client")]
pub use error::SubscriptionClientError;
#[cfg(feature = "client")]
pub use protected::ProtectedEndpoint;
