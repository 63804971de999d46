//! Access ledgers.
//!
//! A ledger is the authoritative record of payments and credential issuance.
//! Three variants share the building blocks in this module:
//!
//! - [`PullPaymentLedger`] - redeems signed authorizations and lets eligible
//!   payers mint one credential each
//! - [`AdminLedger`] - a single admin issues credentials after off-ledger
//!   payment verification
//! - [`ContentLedger`] - one credential per external reference, with a
//!   bidirectional reference map and a mutable metadata base URI
//!
//! Every mutating method takes `&mut self`, so calls against one ledger are
//! serialized by whoever owns it (a `Mutex` when shared). A method that
//! returns `Err` leaves the ledger untouched. Successful mutations append a
//! [`LedgerEvent`] to the ledger's [`AuditLog`].

mod admin;
mod content;
mod pull;

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

pub use admin::AdminLedger;
pub use content::ContentLedger;
pub use pull::PullPaymentLedger;

use crate::authorization::SignedAuthorization;
use crate::error::{LedgerError, RedemptionError, TransferError};
use crate::roles::{AccessControl, Role, RoleChange};
use crate::timestamp::UnixTimestamp;

/// Execution context of a ledger call: who sent it and when it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    /// The caller.
    pub sender: Address,
    /// Execution time; checked against authorization windows.
    pub timestamp: UnixTimestamp,
}

impl Call {
    /// A call from `sender` executing at `timestamp`.
    #[must_use]
    pub const fn new(sender: Address, timestamp: UnixTimestamp) -> Self {
        Self { sender, timestamp }
    }

    /// A call from `sender` executing at the current system time.
    #[must_use]
    pub fn now(sender: Address) -> Self {
        Self::new(sender, UnixTimestamp::now())
    }
}

/// The funds-holding token contract a ledger settles through.
///
/// Implementations perform signature verification, nonce-replay rejection,
/// and validity-window checks atomically inside
/// [`FundsContract::receive_with_authorization`]: either all checks pass and
/// the value moves, or nothing changes.
pub trait FundsContract {
    /// Redeems a receive-style authorization submitted by `caller`, who must
    /// be the authorization's payee.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError`] if any check fails.
    fn receive_with_authorization(
        &mut self,
        caller: Address,
        authorization: &SignedAuthorization,
        now: UnixTimestamp,
    ) -> Result<(), RedemptionError>;

    /// Token balance of `account`.
    fn balance_of(&self, account: Address) -> U256;

    /// Moves `amount` from `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError`] if the transfer cannot be made.
    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), TransferError>;
}

/// Append-only audit record of a successful ledger mutation.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum LedgerEvent {
    /// A payment authorization was redeemed.
    PaymentReceived {
        /// Payer.
        payer: Address,
        /// Amount received.
        #[serde_as(as = "DisplayFromStr")]
        amount: U256,
        /// Authorization nonce.
        nonce: B256,
    },
    /// A credential was issued.
    #[serde(rename = "NFTMinted")]
    NftMinted {
        /// Credential holder.
        recipient: Address,
        /// Credential id.
        #[serde_as(as = "DisplayFromStr")]
        token_id: U256,
    },
    /// A credential was bound to an external reference.
    CredentialLinked {
        /// Credential id.
        #[serde_as(as = "DisplayFromStr")]
        token_id: U256,
        /// External reference id.
        #[serde_as(as = "DisplayFromStr")]
        reference_id: U256,
    },
    /// Proceeds were paid out to the owner.
    Withdrawal {
        /// Receiving owner.
        owner: Address,
        /// Amount withdrawn.
        #[serde_as(as = "DisplayFromStr")]
        amount: U256,
    },
    /// The admin role changed hands.
    AdminChanged {
        /// Previous admin.
        previous: Address,
        /// New admin.
        new: Address,
    },
    /// The owner role changed hands.
    OwnershipTransferred {
        /// Previous owner.
        previous: Address,
        /// New owner.
        new: Address,
    },
    /// The metadata base URI changed.
    BaseUriChanged {
        /// New base URI.
        uri: String,
    },
    /// The minimum payment changed.
    MinimumPaymentChanged {
        /// Previous minimum.
        #[serde_as(as = "DisplayFromStr")]
        previous: U256,
        /// New minimum.
        #[serde_as(as = "DisplayFromStr")]
        new: U256,
    },
}

impl From<RoleChange> for LedgerEvent {
    fn from(change: RoleChange) -> Self {
        match change.role {
            Role::Admin => Self::AdminChanged {
                previous: change.previous,
                new: change.new,
            },
            Role::Owner => Self::OwnershipTransferred {
                previous: change.previous,
                new: change.new,
            },
        }
    }
}

/// Ordered, append-only list of ledger events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLog(Vec<LedgerEvent>);

impl AuditLog {
    /// Appends an event.
    pub fn record(&mut self, event: LedgerEvent) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(?event, "ledger event");
        self.0.push(event);
    }

    /// All events in emission order.
    #[must_use]
    pub fn events(&self) -> &[LedgerEvent] {
        &self.0
    }

    /// The most recent event.
    #[must_use]
    pub fn last(&self) -> Option<&LedgerEvent> {
        self.0.last()
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no event has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A non-fungible access credential.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCredential {
    /// Credential id, starting at 1.
    #[serde_as(as = "DisplayFromStr")]
    pub id: U256,
    /// Holder.
    pub owner: Address,
    /// External reference on the content-linked ledger.
    #[serde_as(as = "Option<DisplayFromStr>")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference_id: Option<U256>,
}

/// Credential ownership and the issuance counter.
///
/// The registry itself enforces no uniqueness rule; each ledger variant
/// applies its own before calling [`CredentialRegistry::issue`].
#[derive(Debug, Clone, Default)]
pub struct CredentialRegistry {
    counter: U256,
    owners: BTreeMap<U256, Address>,
    balances: HashMap<Address, u64>,
}

impl CredentialRegistry {
    /// Issues credential `++counter` to `to` and returns its id.
    pub fn issue(&mut self, to: Address) -> U256 {
        self.counter += U256::from(1u8);
        let id = self.counter;
        self.owners.insert(id, to);
        *self.balances.entry(to).or_default() += 1;
        id
    }

    /// Holder of credential `id`.
    #[must_use]
    pub fn owner_of(&self, id: U256) -> Option<Address> {
        self.owners.get(&id).copied()
    }

    /// Number of credentials held by `owner`.
    #[must_use]
    pub fn balance_of(&self, owner: Address) -> u64 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    /// Total credentials issued.
    #[must_use]
    pub const fn total_issued(&self) -> U256 {
        self.counter
    }

    /// Ids held by `owner`, ascending.
    #[must_use]
    pub fn credentials_of(&self, owner: Address) -> Vec<U256> {
        self.owners
            .iter()
            .filter(|(_, holder)| **holder == owner)
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Pays the ledger's full token balance out to the owner.
///
/// Shared by all ledger variants.
fn withdraw_proceeds<F: FundsContract>(
    call: &Call,
    roles: &AccessControl,
    funds: &mut F,
    ledger: Address,
    log: &mut AuditLog,
) -> Result<U256, LedgerError> {
    roles.ensure_owner(call.sender)?;
    let amount = funds.balance_of(ledger);
    if amount.is_zero() {
        return Err(LedgerError::NothingToWithdraw);
    }
    let owner = roles.owner();
    funds
        .transfer(ledger, owner, amount)
        .map_err(LedgerError::WithdrawalFailed)?;
    #[cfg(feature = "telemetry")]
    tracing::info!(%owner, %amount, "proceeds withdrawn");
    log.record(LedgerEvent::Withdrawal { owner, amount });
    Ok(amount)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_counts_from_one() {
        let mut registry = CredentialRegistry::default();
        let a = Address::repeat_byte(1);
        assert_eq!(registry.issue(a), U256::from(1u8));
        assert_eq!(registry.issue(a), U256::from(2u8));
        assert_eq!(registry.balance_of(a), 2);
        assert_eq!(registry.total_issued(), U256::from(2u8));
        assert_eq!(registry.credentials_of(a), vec![U256::from(1u8), U256::from(2u8)]);
        assert_eq!(registry.owner_of(U256::from(3u8)), None);
    }

    #[test]
    fn nft_minted_event_name() {
        let event = LedgerEvent::NftMinted {
            recipient: Address::ZERO,
            token_id: U256::from(7u8),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "NFTMinted");
        assert_eq!(json["tokenId"], "7");
    }
}
