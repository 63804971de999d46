//! Admin-mediated access ledger.
//!
//! Settlement is verified off-ledger; a single admin then issues credentials.
//! [`AdminLedger::mint`] fails hard on an existing holder while
//! [`AdminLedger::mint_batch`] skips holders so bulk provisioning never
//! reverts on a duplicate.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::{AuditLog, Call, CredentialRegistry, FundsContract, LedgerEvent, withdraw_proceeds};
use crate::error::{CredentialKey, LedgerError};
use crate::roles::AccessControl;

/// Ledger where one admin issues credentials, one per holder.
#[derive(Debug)]
pub struct AdminLedger<F> {
    address: Address,
    funds: F,
    roles: AccessControl,
    credentials: CredentialRegistry,
    holders: HashMap<Address, U256>,
    log: AuditLog,
}

impl<F: FundsContract> AdminLedger<F> {
    /// Creates a ledger at `address` with explicit owner and admin.
    pub fn new(address: Address, owner: Address, admin: Address, funds: F) -> Self {
        Self {
            address,
            funds,
            roles: AccessControl::new(owner, admin),
            credentials: CredentialRegistry::default(),
            holders: HashMap::new(),
            log: AuditLog::default(),
        }
    }

    /// `mint(to)`. Admin only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotAdmin`], [`LedgerError::InvalidRecipient`] for
    /// the zero address, or [`LedgerError::AlreadyMinted`] if `to` holds a
    /// credential.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(to = %to)))]
    pub fn mint(&mut self, call: &Call, to: Address) -> Result<U256, LedgerError> {
        self.roles.ensure_admin(call.sender)?;
        if to.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        if self.holders.contains_key(&to) {
            return Err(LedgerError::AlreadyMinted(CredentialKey::Holder(to)));
        }
        Ok(self.issue(to))
    }

    /// `mintBatch(recipients)`. Admin only.
    ///
    /// Recipients that already hold a credential, or appear earlier in the
    /// same batch, are skipped. Returns the ids issued, in recipient order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotAdmin`], or [`LedgerError::InvalidRecipient`]
    /// if any recipient is the zero address, in which case nothing is minted.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(count = recipients.len())))]
    pub fn mint_batch(
        &mut self,
        call: &Call,
        recipients: &[Address],
    ) -> Result<Vec<U256>, LedgerError> {
        self.roles.ensure_admin(call.sender)?;
        if recipients.iter().any(|a| a.is_zero()) {
            return Err(LedgerError::InvalidRecipient);
        }
        let mut seen = HashSet::with_capacity(recipients.len());
        let mut issued = Vec::new();
        for &to in recipients {
            if !seen.insert(to) || self.holders.contains_key(&to) {
                #[cfg(feature = "telemetry")]
                tracing::debug!(%to, "skipping duplicate recipient");
                continue;
            }
            issued.push(self.issue(to));
        }
        Ok(issued)
    }

    /// `setAdmin(newAdmin)`. Owner only; the previous admin loses minting rights
    /// in the same call.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] or [`LedgerError::InvalidRecipient`].
    pub fn set_admin(&mut self, call: &Call, new_admin: Address) -> Result<(), LedgerError> {
        let change = self.roles.set_admin(call.sender, new_admin)?;
        self.log.record(change.into());
        Ok(())
    }

    /// Hands ownership to `new_owner`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] or [`LedgerError::InvalidRecipient`].
    pub fn transfer_ownership(&mut self, call: &Call, new_owner: Address) -> Result<(), LedgerError> {
        let change = self.roles.transfer_ownership(call.sender, new_owner)?;
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

    fn issue(&mut self, to: Address) -> U256 {
        let token_id = self.credentials.issue(to);
        self.holders.insert(to, token_id);
        self.log.record(LedgerEvent::NftMinted {
            recipient: to,
            token_id,
        });
        token_id
    }

    /// Whether `account` holds a credential.
    #[must_use]
    pub fn has_minted(&self, account: Address) -> bool {
        self.holders.contains_key(&account)
    }

    /// Whether an admin mint to `account` would succeed.
    #[must_use]
    pub fn can_mint(&self, account: Address) -> bool {
        !account.is_zero() && !self.has_minted(account)
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

    /// Holder of credential `id`.
    #[must_use]
    pub fn owner_of(&self, id: U256) -> Option<Address> {
        self.credentials.owner_of(id)
    }

    /// Ledger address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
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
    const NEW_ADMIN: Address = Address::repeat_byte(0x03);
    const A: Address = Address::repeat_byte(0x0A);
    const B: Address = Address::repeat_byte(0x0B);

    fn ledger() -> AdminLedger<MockFunds> {
        AdminLedger::new(LEDGER, OWNER, ADMIN, MockFunds::default())
    }

    fn call(sender: Address) -> Call {
        Call::new(sender, UnixTimestamp::from_secs(1))
    }

    #[test]
    fn mint_requires_admin() {
        let mut ledger = ledger();
        assert_eq!(ledger.mint(&call(OWNER), A), Err(LedgerError::NotAdmin(OWNER)));
        assert_eq!(ledger.mint(&call(ADMIN), A), Ok(U256::from(1u8)));
    }

    #[test]
    fn mint_rejects_existing_holder_and_zero() {
        let mut ledger = ledger();
        ledger.mint(&call(ADMIN), A).unwrap();
        assert_eq!(
            ledger.mint(&call(ADMIN), A),
            Err(LedgerError::AlreadyMinted(CredentialKey::Holder(A)))
        );
        assert_eq!(
            ledger.mint(&call(ADMIN), Address::ZERO),
            Err(LedgerError::InvalidRecipient)
        );
        assert_eq!(ledger.total_issued(), U256::from(1u8));
    }

    #[test]
    fn batch_skips_duplicates() {
        let mut ledger = ledger();
        ledger.mint(&call(ADMIN), A).unwrap();
        let before = ledger.total_issued();

        let issued = ledger.mint_batch(&call(ADMIN), &[A, A, B]).unwrap();

        assert_eq!(issued, vec![U256::from(2u8)]);
        assert_eq!(ledger.total_issued() - before, U256::from(1u8));
        assert_eq!(ledger.owner_of(U256::from(2u8)), Some(B));
    }

    #[test]
    fn batch_dedupes_within_itself() {
        let mut ledger = ledger();
        let issued = ledger.mint_batch(&call(ADMIN), &[B, A, B, A]).unwrap();
        assert_eq!(issued.len(), 2);
        assert_eq!(ledger.total_issued(), U256::from(2u8));
    }

    #[test]
    fn batch_with_zero_address_mints_nothing() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.mint_batch(&call(ADMIN), &[A, Address::ZERO]),
            Err(LedgerError::InvalidRecipient)
        );
        assert!(!ledger.has_minted(A));
    }

    #[test]
    fn set_admin_is_atomic() {
        let mut ledger = ledger();
        ledger.set_admin(&call(OWNER), NEW_ADMIN).unwrap();
        assert_eq!(ledger.mint(&call(ADMIN), A), Err(LedgerError::NotAdmin(ADMIN)));
        assert!(ledger.mint(&call(NEW_ADMIN), A).is_ok());
        assert_eq!(
            ledger.mint_batch(&call(ADMIN), &[B]),
            Err(LedgerError::NotAdmin(ADMIN))
        );
        assert!(ledger.events().events().contains(&LedgerEvent::AdminChanged {
            previous: ADMIN,
            new: NEW_ADMIN
        }));
    }

    #[test]
    fn only_owner_sets_admin() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.set_admin(&call(ADMIN), NEW_ADMIN),
            Err(LedgerError::NotOwner(ADMIN))
        );
        assert_eq!(ledger.roles().admin(), ADMIN);
    }

    #[test]
    fn withdraw_off_ledger_proceeds() {
        let mut ledger = AdminLedger::new(LEDGER, OWNER, ADMIN, MockFunds::funded(LEDGER, 42));
        assert_eq!(ledger.withdraw(&call(ADMIN)), Err(LedgerError::NotOwner(ADMIN)));
        assert_eq!(ledger.withdraw(&call(OWNER)), Ok(U256::from(42u8)));
        assert_eq!(ledger.withdraw(&call(OWNER)), Err(LedgerError::NothingToWithdraw));
    }
}
