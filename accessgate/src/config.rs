//! Configuration value types.
//!
//! These are plain serde structs; loading them from files and the
//! environment is left to the binary that embeds them.

use std::time::Duration;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// Parameters of a deployed pull-payment ledger.
///
/// # Example
///
/// ```rust
/// use accessgate::config::LedgerConfig;
///
/// let config: LedgerConfig = serde_json::from_value(serde_json::json!({
///     "address": "0x00000000000000000000000000000000000000aa",
///     "owner": "0x0000000000000000000000000000000000000001",
///     "minimumPayment": "10000",
/// }))
/// .unwrap();
/// assert_eq!(config.minimum_payment.to::<u64>(), 10_000);
/// ```
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerConfig {
    /// Ledger address; the payee of every redeemed authorization.
    pub address: Address,
    /// Initial owner, who also starts as admin.
    pub owner: Address,
    /// Minimum authorization value, in token units.
    #[serde_as(as = "DisplayFromStr")]
    pub minimum_payment: U256,
}

/// How much a subscription buys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubscriptionPolicy {
    /// Protected calls per subscription.
    #[serde(default = "SubscriptionPolicy::default_query_limit")]
    pub query_limit: u32,
    /// Days until the subscription expires.
    #[serde(default = "SubscriptionPolicy::default_expiration_days")]
    pub expiration_days: u32,
}

impl SubscriptionPolicy {
    const fn default_query_limit() -> u32 {
        100
    }

    const fn default_expiration_days() -> u32 {
        30
    }

    /// Whether the policy can produce a usable subscription.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.query_limit > 0 && self.expiration_days > 0
    }
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            query_limit: Self::default_query_limit(),
            expiration_days: Self::default_expiration_days(),
        }
    }
}

/// Client-side retry behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Delay before the single retry with a fresh authorization, in milliseconds.
    #[serde(default = "RetryPolicy::default_backoff_ms")]
    pub backoff_ms: u64,
}

impl RetryPolicy {
    const fn default_backoff_ms() -> u64 {
        1_000
    }

    /// A policy with the given backoff.
    #[must_use]
    pub fn with_backoff(backoff: Duration) -> Self {
        Self {
            backoff_ms: u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The backoff as a [`Duration`].
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: Self::default_backoff_ms(),
        }
    }
}
