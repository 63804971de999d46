//! Error types for payment authorization, ledger calls, and subscriptions.
//!
//! Only [`SubscriptionError`] is eligible for the one-shot automatic retry of
//! the [`retry`](crate::retry) coordinator. Ledger errors are terminal reverts.

use std::fmt;

use alloy_primitives::{Address, U256};

/// Errors while building or checking a payment authorization.
///
/// A user declining to sign is not an error; see
/// [`SignOutcome::Cancelled`](crate::authorization::SignOutcome::Cancelled).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// The authorization could not be built (no signing key, bad parameters,
    /// or the signer failed).
    #[error("Failed to build payment authorization: {0}")]
    Build(String),
    /// The signature does not recover to the payer.
    #[error("Invalid authorization signature: {0}")]
    SignatureInvalid(String),
}

/// Rejections raised by the funds-holding contract while redeeming an authorization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RedemptionError {
    /// The signature does not recover to the authorization's `from` address.
    #[error("Invalid signature")]
    SignatureInvalid,
    /// The (payer, nonce) pair has already been redeemed.
    #[error("Authorization is used or canceled")]
    AuthorizationUsed,
    /// Redemption time is before `validAfter`.
    #[error("Authorization is not yet valid")]
    AuthorizationNotYetValid,
    /// Redemption time is after `validBefore`.
    #[error("Authorization is expired")]
    AuthorizationExpired,
    /// A receive-style authorization was submitted by someone other than the payee.
    #[error("Caller must be the payee")]
    CallerMustBePayee,
    /// The authorization pays the zero address.
    #[error("Authorization recipient is the zero address")]
    InvalidRecipient,
    /// The payer cannot cover the value.
    #[error("Transfer amount {required} exceeds balance {available}")]
    InsufficientBalance {
        /// Payer balance at redemption time.
        available: U256,
        /// Authorization value.
        required: U256,
    },
}

/// Errors from a plain token transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The sender cannot cover the amount.
    #[error("Transfer amount {required} exceeds balance {available}")]
    InsufficientBalance {
        /// Sender balance.
        available: U256,
        /// Requested amount.
        required: U256,
    },
    /// The transfer targets the zero address.
    #[error("Transfer to the zero address")]
    ZeroAddress,
}

/// The uniqueness key a ledger variant enforces for credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKey {
    /// One credential per holder (pull-payment and admin-mediated ledgers).
    Holder(Address),
    /// One credential per external reference (content-linked ledger).
    Reference(U256),
}

impl fmt::Display for CredentialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Holder(address) => write!(f, "holder {address}"),
            Self::Reference(id) => write!(f, "reference {id}"),
        }
    }
}

/// Typed, reverting ledger errors.
///
/// A ledger call that returns one of these has changed no state. None of them
/// is ever retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The authorization value is below the configured minimum.
    #[error("Payment {sent} below minimum {required}")]
    PaymentBelowMinimum {
        /// Value carried by the authorization.
        sent: U256,
        /// Configured minimum.
        required: U256,
    },
    /// The caller has not redeemed a payment.
    #[error("{0} is not whitelisted")]
    NotWhitelisted(Address),
    /// A credential already exists for this key.
    #[error("Credential already minted for {0}")]
    AlreadyMinted(CredentialKey),
    /// Withdrawal requested with a zero balance.
    #[error("Nothing to withdraw")]
    NothingToWithdraw,
    /// The proceeds transfer to the owner failed.
    #[error("Withdrawal failed: {0}")]
    WithdrawalFailed(#[source] TransferError),
    /// The caller is not the admin.
    #[error("{0} is not the admin")]
    NotAdmin(Address),
    /// The caller is not the owner.
    #[error("{0} is not the owner")]
    NotOwner(Address),
    /// The recipient is the zero address.
    #[error("Invalid recipient")]
    InvalidRecipient,
    /// The external reference id is zero.
    #[error("Invalid reference id")]
    InvalidReferenceId,
    /// No credential with this id exists.
    #[error("Credential {0} does not exist")]
    NonexistentCredential(U256),
    /// The funds-holding contract rejected the authorization.
    #[error("Redemption rejected: {0}")]
    Redemption(#[from] RedemptionError),
}

/// Errors raised by the subscription quota tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum SubscriptionError {
    /// The subscription is past its expiration time.
    #[error("Subscription expired")]
    Expired,
    /// The subscription has no queries left.
    #[error("Subscription exhausted")]
    Exhausted,
    /// No subscription exists for the transaction hash.
    #[error("Subscription not found")]
    NotFound,
    /// A subscription already exists for the transaction hash.
    #[error("Subscription already exists")]
    AlreadyExists,
}

impl SubscriptionError {
    /// Machine-readable code used in HTTP error envelopes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Expired => "subscription_expired",
            Self::Exhausted => "subscription_exhausted",
            Self::NotFound => "subscription_not_found",
            Self::AlreadyExists => "subscription_exists",
        }
    }

    /// Parses a code produced by [`SubscriptionError::code`].
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "subscription_expired" => Some(Self::Expired),
            "subscription_exhausted" => Some(Self::Exhausted),
            "subscription_not_found" => Some(Self::NotFound),
            "subscription_exists" => Some(Self::AlreadyExists),
            _ => None,
        }
    }

    /// Whether a fresh payment can replace the subscription.
    ///
    /// `AlreadyExists` is a creation conflict, not an invalid subscription.
    #[must_use]
    pub const fn invalidates_subscription(&self) -> bool {
        matches!(self, Self::Expired | Self::Exhausted | Self::NotFound)
    }
}
