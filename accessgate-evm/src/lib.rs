#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) binding for payment-gated access.
//!
//! Payment authorizations are ERC-3009 `TransferWithAuthorization` or
//! `ReceiveWithAuthorization` messages signed under the token's EIP-712
//! domain. This crate signs and verifies them, provides an in-process
//! ERC-3009 token the ledgers in `accessgate` settle through, and maps the
//! ledgers onto their Solidity ABI.
//!
//! # Modules
//!
//! - [`chain`] - Chain ids, CAIP-2 identifiers, and token EIP-712 domains
//! - [`types`] - Typed-data structs and the transport bundle
//! - [`signature`] - `(v, r, s)` conversion and signer recovery
//! - [`token`] - In-process ERC-3009 funds-holding token
//! - [`contract`] - Solidity interfaces of the ledgers and token
//! - [`abi`] - Calldata, revert, and event encoding
//! - `builder` - Client-side authorization builder (`client` feature)
//!
//! # Feature Flags
//!
//! - `client` - Authorization building and signing (default)
//! - `telemetry` - Enables tracing instrumentation

pub mod abi;
pub mod chain;
pub mod contract;
pub mod signature;
pub mod token;
pub mod types;

#[cfg(feature = "client")]
pub mod builder;

mod networks;
pub use networks::*;

pub use token::Erc3009Token;
pub use types::{AuthorizationBundle, AuthorizationKind};

#[cfg(feature = "client")]
pub use builder::{AuthorizationBuilder, AuthorizationRequest, BuildError, SignerLike};
