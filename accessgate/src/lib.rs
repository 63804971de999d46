#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for payment-gated access.
//!
//! A payer signs a time-bounded, nonce-scoped payment authorization. An
//! access ledger redeems it with replay protection and issues a scarce,
//! non-transferable access credential. A successful payment also opens a
//! quota-bound subscription that governs how many protected calls it buys,
//! and a client-side coordinator substitutes a fresh authorization, once,
//! when the server reports that subscription invalid.
//!
//! This crate is chain-agnostic. Signing, signature recovery, and the ABI
//! surface live in `accessgate-evm`; the HTTP boundary lives in
//! `accessgate-http`.
//!
//! # Modules
//!
//! - [`amount`] - Human-readable token amount parsing
//! - [`authorization`] - Signed payment authorizations and signing outcomes
//! - [`config`] - Ledger, subscription, and retry configuration values
//! - [`encoding`] - Base64 JSON transport encoding
//! - [`error`] - Authorization, ledger, and subscription errors
//! - [`ledger`] - Pull-payment, admin-mediated, and content-linked ledgers
//! - [`retry`] - Retry state machine and single-flight coordinator
//! - [`roles`] - Owner and admin roles
//! - [`subscription`] - Subscription quota tracking
//! - [`timestamp`] - Unix timestamps
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation

pub mod amount;
pub mod authorization;
pub mod config;
pub mod encoding;
pub mod error;
pub mod ledger;
pub mod retry;
pub mod roles;
pub mod subscription;
pub mod timestamp;
