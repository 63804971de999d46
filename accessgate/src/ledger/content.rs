//! Content-linked access ledger.
//!
//! Gating is per resource rather than per payer: each external reference id
//! (a dataroom, an agent, a document) can be bound to exactly one credential.
//! The reference↔credential maps are always written together.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::{
    AccessCredential, AuditLog, Call, CredentialRegistry, FundsContract, LedgerEvent,
    withdraw_proceeds,
};
use crate::error::{CredentialKey, LedgerError};
use crate::roles::AccessControl;

/// Ledger issuing one credential per external reference id.
#[derive(Debug)]
pub struct ContentLedger<F> {
    address: Address,
    funds: F,
    roles: AccessControl,
    credentials: CredentialRegistry,
    reference_to_token: HashMap<U256, U256>,
    token_to_reference: HashMap<U256, U256>,
    base_uri: String,
    log: AuditLog,
}

impl<F: FundsContract> ContentLedger<F> {
    /// Creates a ledger at `address` with explicit owner and admin.
    pub fn new(
        address: Address,
        owner: Address,
        admin: Address,
        base_uri: impl Into<String>,
        funds: F,
    ) -> Self {
        Self {
            address,
            funds,
            roles: AccessControl::new(owner, admin),
            credentials: CredentialRegistry::default(),
            reference_to_token: HashMap::new(),
            token_to_reference: HashMap::new(),
            base_uri: base_uri.into(),
            log: AuditLog::default(),
        }
    }

    /// `mintWithReference(to, refId)`. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotAdmin`], [`LedgerError::InvalidRecipient`],
    /// [`LedgerError::InvalidReferenceId`], or [`LedgerError::AlreadyMinted`]
    /// when `reference_id` is already bound.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        to = %to,
        reference_id = %reference_id
    )))]
    pub fn mint_with_reference(
        &mut self,
        call: &Call,
        to: Address,
        reference_id: U256,
    ) -> Result<U256, LedgerError> {
        self.roles.ensure_admin(call.sender)?;
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        if reference_id.is_zero() {
            return Err(LedgerError::InvalidReferenceId);
        }
        if self.reference_to_token.contains_key(&reference_id) {
            return Err(LedgerError::AlreadyMinted(CredentialKey::Reference(
                reference_id,
            )));
        }
        let token_id = self.credentials.issue(to);
        self.reference_to_token.insert(reference_id, token_id);
        self.token_to_reference.insert(token_id, reference_id);
        self.log.record(LedgerEvent::NftMinted {
            recipient: to,
            token_id,
        });
        self.log.record(LedgerEvent::CredentialLinked {
            token_id,
            reference_id,
        });
        Ok(token_id)
    }

    /// Metadata address of credential `token_id`: `baseURI + id`.
    ///
    /// Resolved against the current base URI, so changing it moves every
    /// issued credential.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NonexistentCredential`] for unknown ids.
    pub fn token_uri(&self, token_id: U256) -> Result<String, LedgerError> {
        if self.credentials.owner_of(token_id).is_none() {
            return Err(LedgerError::NonexistentCredential(token_id));
        }
        Ok(format!("{}{token_id}", self.base_uri))
    }

    /// Replaces the metadata base URI. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`].
    pub fn set_base_uri(&mut self, call: &Call, base_uri: impl Into<String>) -> Result<(), LedgerError> {
        self.roles.ensure_owner(call.sender)?;
        self.base_uri = base_uri.into();
        self.log.record(LedgerEvent::BaseUriChanged {
            uri: self.base_uri.clone(),
        });
        Ok(())
    }

    /// `setAdmin(newAdmin)`. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] or [`LedgerError::InvalidRecipient`].
    pub fn set_admin(&mut self, call: &Call, new_admin: Address) -> Result<(), LedgerError> {
        let change = self.roles.set_admin(call.sender, new_admin)?;
        self.log.record(change.into());
        Ok(())
    }

    /// `withdraw()`: pays the full balance to the owner.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`], [`LedgerError::NothingToWithdraw`],
    /// or [`LedgerError::WithdrawalFailed`].
    pub fn withdraw(&mut self, call: &Call) -> Result<U256, LedgerError> {
        withdraw_proceeds(
            call,
            &self.roles,
            &mut self.funds,
            self.address,
            &mut self.log,
        )
    }

    /// Credential bound to `reference_id`.
    #[must_use]
    pub fn token_of(&self, reference_id: U256) -> Option<U256> {
        self.reference_to_token.get(&reference_id).copied()
    }

    /// External reference bound to `token_id`.
    #[must_use]
    pub fn reference_of(&self, token_id: U256) -> Option<U256> {
        self.token_to_reference.get(&token_id).copied()
    }

    /// Whether `reference_id` already has a credential.
    #[must_use]
    pub fn is_reference_minted(&self, reference_id: U256) -> bool {
        self.reference_to_token.contains_key(&reference_id)
    }

    /// Full credential record for `token_id`.
    #[must_use]
    pub fn credential(&self, token_id: U256) -> Option<AccessCredential> {
        let owner = self.credentials.owner_of(token_id)?;
        Some(AccessCredential {
            id: token_id,
            owner,
            external_reference_id: self.reference_of(token_id),
        })
    }

    /// Total credentials issued.
    #[must_use]
    pub const fn total_issued(&self) -> U256 {
        self.credentials.total_issued()
    }

    /// Proceeds currently held by the ledger.
    #[must_use]
    pub fn balance(&self) -> U256 {
        self.funds.balance_of(self.address)
    }

    /// Current metadata base URI.
    #[must_use]
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Role holders.
    #[must_use]
    pub const fn roles(&self) -> &AccessControl {
        &self.roles
    }

    /// The audit log.
    #[must_use]
    pub const fn events(&self) -> &AuditLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::testing::MockFunds;
    use crate::timestamp::UnixTimestamp;

    const LEDGER: Address = Address::repeat_byte(0xAA);
    const OWNER: Address = Address::repeat_byte(0x01);
    const ADMIN: Address = Address::repeat_byte(0x02);
    const HOLDER: Address = Address::repeat_byte(0x0A);

    fn ledger() -> ContentLedger<MockFunds> {
        ContentLedger::new(
            LEDGER,
            OWNER,
            ADMIN,
            "ipfs://meta/",
            MockFunds::default(),
        )
    }

    fn call(sender: Address) -> Call {
        Call::new(sender, UnixTimestamp::from_secs(1))
    }

    fn assert_maps_are_inverse(ledger: &ContentLedger<MockFunds>) {
        assert_eq!(
            ledger.reference_to_token.len(),
            ledger.token_to_reference.len()
        );
        for (reference, token) in &ledger.reference_to_token {
            assert_eq!(ledger.token_to_reference.get(token), Some(reference));
        }
        for (token, reference) in &ledger.token_to_reference {
            assert_eq!(ledger.reference_to_token.get(reference), Some(token));
        }
    }

    #[test]
    fn validates_inputs() {
        let mut ledger = ledger();
        let r = U256::from(7u8);
        assert_eq!(
            ledger.mint_with_reference(&call(OWNER), HOLDER, r),
            Err(LedgerError::NotAdmin(OWNER))
        );
        assert_eq!(
            ledger.mint_with_reference(&call(ADMIN), Address::ZERO, r),
            Err(LedgerError::InvalidRecipient)
        );
        assert_eq!(
            ledger.mint_with_reference(&call(ADMIN), HOLDER, U256::ZERO),
            Err(LedgerError::InvalidReferenceId)
        );
        assert_eq!(ledger.total_issued(), U256::ZERO);
        assert_maps_are_inverse(&ledger);
    }

    #[test]
    fn one_credential_per_reference() {
        let mut ledger = ledger();
        let r = U256::from(7u8);
        let id = ledger.mint_with_reference(&call(ADMIN), HOLDER, r).unwrap();
        assert_eq!(
            ledger.mint_with_reference(&call(ADMIN), OWNER, r),
            Err(LedgerError::AlreadyMinted(CredentialKey::Reference(r)))
        );
        // The same holder may hold credentials for different references.
        let other = ledger
            .mint_with_reference(&call(ADMIN), HOLDER, U256::from(8u8))
            .unwrap();
        assert_ne!(id, other);
        assert_eq!(ledger.token_of(r), Some(id));
        assert_eq!(ledger.reference_of(id), Some(r));
        assert_maps_are_inverse(&ledger);
    }

    #[test]
    fn maps_stay_inverse_over_many_mints() {
        let mut ledger = ledger();
        for i in 1..=50u64 {
            let reference = U256::from(i * 31 % 17 + 1);
            let _ = ledger.mint_with_reference(&call(ADMIN), HOLDER, reference);
            assert_maps_are_inverse(&ledger);
        }
        assert_eq!(ledger.total_issued(), U256::from(17u8));
    }

    #[test]
    fn base_uri_change_applies_to_issued_credentials() {
        let mut ledger = ledger();
        let id = ledger
            .mint_with_reference(&call(ADMIN), HOLDER, U256::from(9u8))
            .unwrap();
        assert_eq!(ledger.token_uri(id).unwrap(), "ipfs://meta/1");

        assert_eq!(
            ledger.set_base_uri(&call(ADMIN), "https://x/"),
            Err(LedgerError::NotOwner(ADMIN))
        );
        ledger.set_base_uri(&call(OWNER), "https://cdn.example/").unwrap();
        assert_eq!(ledger.token_uri(id).unwrap(), "https://cdn.example/1");
        assert_eq!(
            ledger.token_uri(U256::from(2u8)),
            Err(LedgerError::NonexistentCredential(U256::from(2u8)))
        );
    }

    #[test]
    fn credential_record_includes_reference() {
        let mut ledger = ledger();
        let id = ledger
            .mint_with_reference(&call(ADMIN), HOLDER, U256::from(3u8))
            .unwrap();
        let credential = ledger.credential(id).unwrap();
        assert_eq!(credential.owner, HOLDER);
        assert_eq!(credential.external_reference_id, Some(U256::from(3u8)));
    }

    #[test]
    fn set_admin_moves_minting_rights() {
        let mut ledger = ledger();
        ledger.set_admin(&call(OWNER), OWNER).unwrap();
        assert_eq!(
            ledger.mint_with_reference(&call(ADMIN), HOLDER, U256::from(1u8)),
            Err(LedgerError::NotAdmin(ADMIN))
        );
        assert!(ledger
            .mint_with_reference(&call(OWNER), HOLDER, U256::from(1u8))
            .is_ok());
    }
}
