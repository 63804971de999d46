//! Pull-payment access ledger.
//!
//! Payment and issuance are two separate calls. [`PullPaymentLedger::redeem_authorization`]
//! pulls funds through the token's authorization entry point and marks the
//! payer eligible; [`PullPaymentLedger::mint_access_credential`] then issues
//! one credential to an eligible caller. A payment that settles but fails to
//! confer access can be followed by another mint attempt without paying again.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};
#[cfg(feature = "telemetry")]
use tracing::instrument;

use super::{AuditLog, Call, CredentialRegistry, FundsContract, LedgerEvent, withdraw_proceeds};
use crate::authorization::RedeemAuthorization;
use crate::config::LedgerConfig;
use crate::error::{CredentialKey, LedgerError};
use crate::roles::AccessControl;

/// Ledger that redeems signed authorizations and issues one credential per payer.
#[derive(Debug)]
pub struct PullPaymentLedger<F> {
    address: Address,
    minimum_payment: U256,
    funds: F,
    roles: AccessControl,
    credentials: CredentialRegistry,
    eligible: HashSet<Address>,
    holders: HashMap<Address, U256>,
    log: AuditLog,
}

impl<F: FundsContract> PullPaymentLedger<F> {
    /// Creates a ledger deployed at `address`, owned by `owner`.
    pub fn new(address: Address, owner: Address, minimum_payment: U256, funds: F) -> Self {
        Self {
            address,
            minimum_payment,
            funds,
            roles: AccessControl::owned_by(owner),
            credentials: CredentialRegistry::default(),
            eligible: HashSet::new(),
            holders: HashMap::new(),
            log: AuditLog::default(),
        }
    }

    /// Creates a ledger from configuration.
    pub fn from_config(config: &LedgerConfig, funds: F) -> Self {
        Self::new(config.address, config.owner, config.minimum_payment, funds)
    }

    /// `redeemAuthorization(from, value, validAfter, validBefore, nonce, v, r, s)`.
    ///
    /// Rejects values below the minimum, then forwards the authorization to the
    /// funds contract with this ledger as payee. On success the payer becomes
    /// eligible to mint. Redeeming again with a new authorization re-asserts
    /// eligibility.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PaymentBelowMinimum`] or
    /// [`LedgerError::Redemption`]; neither changes any state.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        payer = %redeem.from,
        value = %redeem.value
    )))]
    pub fn redeem_authorization(
        &mut self,
        call: &Call,
        redeem: &RedeemAuthorization,
    ) -> Result<(), LedgerError> {
        if redeem.value < self.minimum_payment {
            return Err(LedgerError::PaymentBelowMinimum {
                sent: redeem.value,
                required: self.minimum_payment,
            });
        }
        let signed = redeem.with_payee(self.address);
        self.funds
            .receive_with_authorization(self.address, &signed, call.timestamp)?;
        self.eligible.insert(redeem.from);
        self.log.record(LedgerEvent::PaymentReceived {
            payer: redeem.from,
            amount: redeem.value,
            nonce: redeem.nonce,
        });
        Ok(())
    }

    /// `mintAccessCredential()`: issues a credential to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotWhitelisted`] if the caller never redeemed a
    /// payment and [`LedgerError::AlreadyMinted`] if it already holds one.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(caller = %call.sender)))]
    pub fn mint_access_credential(&mut self, call: &Call) -> Result<U256, LedgerError> {
        let caller = call.sender;
        if !self.eligible.contains(&caller) {
            return Err(LedgerError::NotWhitelisted(caller));
        }
        if self.holders.contains_key(&caller) {
            return Err(LedgerError::AlreadyMinted(CredentialKey::Holder(caller)));
        }
        let token_id = self.credentials.issue(caller);
        self.holders.insert(caller, token_id);
        self.log.record(LedgerEvent::NftMinted {
            recipient: caller,
            token_id,
        });
        Ok(token_id)
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

    /// Changes the minimum accepted payment. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`].
    pub fn set_minimum_payment(&mut self, call: &Call, minimum: U256) -> Result<(), LedgerError> {
        self.roles.ensure_owner(call.sender)?;
        let previous = std::mem::replace(&mut self.minimum_payment, minimum);
        self.log.record(LedgerEvent::MinimumPaymentChanged {
            previous,
            new: minimum,
        });
        Ok(())
    }

    /// Hands ownership (and with it the proceeds) to `new_owner`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] or [`LedgerError::InvalidRecipient`].
    pub fn transfer_ownership(&mut self, call: &Call, new_owner: Address) -> Result<(), LedgerError> {
        let change = self.roles.transfer_ownership(call.sender, new_owner)?;
        self.log.record(change.into());
        Ok(())
    }

    /// Whether `account` has redeemed a payment.
    #[must_use]
    pub fn is_eligible(&self, account: Address) -> bool {
        self.eligible.contains(&account)
    }

    /// Whether `account` holds a credential.
    #[must_use]
    pub fn has_minted(&self, account: Address) -> bool {
        self.holders.contains_key(&account)
    }

    /// Whether a mint from `account` would succeed.
    #[must_use]
    pub fn can_mint(&self, account: Address) -> bool {
        self.is_eligible(account) && !self.has_minted(account)
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

    /// Credential id held by `account`.
    #[must_use]
    pub fn credential_of(&self, account: Address) -> Option<U256> {
        self.holders.get(&account).copied()
    }

    /// Number of credentials held by `account`.
    #[must_use]
    pub fn credential_count(&self, account: Address) -> u64 {
        self.credentials.balance_of(account)
    }

    /// Configured minimum payment.
    #[must_use]
    pub const fn minimum_payment(&self) -> U256 {
        self.minimum_payment
    }

    /// Ledger address (payee of redeemed authorizations).
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Role holders.
    #[must_use]
    pub const fn roles(&self) -> &AccessControl {
        &self.roles
    }

    /// The funds contract.
    #[must_use]
    pub const fn funds(&self) -> &F {
        &self.funds
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
    use crate::error::RedemptionError;
    use crate::ledger::testing::{MockFunds, authorization};
    use crate::timestamp::UnixTimestamp;

    const LEDGER: Address = Address::repeat_byte(0xAA);
    const OWNER: Address = Address::repeat_byte(0x01);
    const PAYER: Address = Address::repeat_byte(0x02);
    const MINIMUM: u64 = 1_000;

    fn ledger() -> PullPaymentLedger<MockFunds> {
        PullPaymentLedger::new(
            LEDGER,
            OWNER,
            U256::from(MINIMUM),
            MockFunds::funded(PAYER, 10_000),
        )
    }

    fn call(sender: Address) -> Call {
        Call::new(sender, UnixTimestamp::from_secs(500))
    }

    fn redeem(value: u64, nonce: u8) -> RedeemAuthorization {
        authorization(PAYER, LEDGER, value, nonce).redeem_call()
    }

    #[test]
    fn redeem_then_mint() {
        let mut ledger = ledger();
        assert!(!ledger.can_mint(PAYER));
        ledger.redeem_authorization(&call(OWNER), &redeem(MINIMUM, 1)).unwrap();
        assert!(ledger.is_eligible(PAYER));
        assert!(ledger.can_mint(PAYER));
        assert_eq!(ledger.balance(), U256::from(MINIMUM));

        let id = ledger.mint_access_credential(&call(PAYER)).unwrap();
        assert_eq!(id, U256::from(1u8));
        assert!(ledger.has_minted(PAYER));
        assert!(!ledger.can_mint(PAYER));
        assert_eq!(
            ledger.events().last(),
            Some(&LedgerEvent::NftMinted {
                recipient: PAYER,
                token_id: id
            })
        );
    }

    #[test]
    fn second_mint_fails_and_count_stays_one() {
        let mut ledger = ledger();
        ledger.redeem_authorization(&call(PAYER), &redeem(MINIMUM, 1)).unwrap();
        ledger.mint_access_credential(&call(PAYER)).unwrap();
        let err = ledger.mint_access_credential(&call(PAYER)).unwrap_err();
        assert_eq!(err, LedgerError::AlreadyMinted(CredentialKey::Holder(PAYER)));
        assert_eq!(ledger.credential_count(PAYER), 1);
        assert_eq!(ledger.total_issued(), U256::from(1u8));
    }

    #[test]
    fn below_minimum_changes_nothing() {
        let mut ledger = ledger();
        let events_before = ledger.events().len();
        let err = ledger
            .redeem_authorization(&call(PAYER), &redeem(MINIMUM - 1, 1))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::PaymentBelowMinimum {
                sent: U256::from(MINIMUM - 1),
                required: U256::from(MINIMUM),
            }
        );
        assert!(!ledger.is_eligible(PAYER));
        assert_eq!(ledger.balance(), U256::ZERO);
        assert_eq!(ledger.funds().balance_of(PAYER), U256::from(10_000u64));
        assert_eq!(ledger.events().len(), events_before);
    }

    #[test]
    fn mint_without_payment_is_not_whitelisted() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.mint_access_credential(&call(PAYER)),
            Err(LedgerError::NotWhitelisted(PAYER))
        );
    }

    #[test]
    fn replayed_authorization_is_rejected() {
        let mut ledger = ledger();
        ledger.redeem_authorization(&call(PAYER), &redeem(MINIMUM, 1)).unwrap();
        let err = ledger
            .redeem_authorization(&call(PAYER), &redeem(MINIMUM, 1))
            .unwrap_err();
        assert_eq!(err, LedgerError::Redemption(RedemptionError::AuthorizationUsed));
        assert_eq!(ledger.balance(), U256::from(MINIMUM));
    }

    #[test]
    fn redeeming_again_reasserts_eligibility() {
        let mut ledger = ledger();
        ledger.redeem_authorization(&call(PAYER), &redeem(MINIMUM, 1)).unwrap();
        ledger.mint_access_credential(&call(PAYER)).unwrap();
        ledger.redeem_authorization(&call(PAYER), &redeem(MINIMUM, 2)).unwrap();
        assert!(ledger.is_eligible(PAYER));
        assert_eq!(ledger.total_issued(), U256::from(1u8));
    }

    #[test]
    fn expired_window_is_rejected() {
        let mut ledger = ledger();
        let late = Call::new(PAYER, UnixTimestamp::from_secs(10_001));
        let err = ledger
            .redeem_authorization(&late, &redeem(MINIMUM, 1))
            .unwrap_err();
        assert_eq!(err, LedgerError::Redemption(RedemptionError::AuthorizationExpired));
        assert!(!ledger.is_eligible(PAYER));
    }

    #[test]
    fn withdraw_zero_balance_fails() {
        let mut ledger = ledger();
        assert_eq!(ledger.withdraw(&call(OWNER)), Err(LedgerError::NothingToWithdraw));
    }

    #[test]
    fn withdraw_pays_owner_in_full() {
        let mut ledger = ledger();
        ledger.redeem_authorization(&call(PAYER), &redeem(2_500, 1)).unwrap();
        assert_eq!(ledger.withdraw(&call(PAYER)), Err(LedgerError::NotOwner(PAYER)));
        assert_eq!(ledger.withdraw(&call(OWNER)), Ok(U256::from(2_500u64)));
        assert_eq!(ledger.balance(), U256::ZERO);
        assert_eq!(ledger.funds().balance_of(OWNER), U256::from(2_500u64));
        assert_eq!(
            ledger.events().last(),
            Some(&LedgerEvent::Withdrawal {
                owner: OWNER,
                amount: U256::from(2_500u64)
            })
        );
    }

    #[test]
    fn failed_transfer_surfaces_withdrawal_failed() {
        let mut ledger = ledger();
        ledger.redeem_authorization(&call(PAYER), &redeem(MINIMUM, 1)).unwrap();
        ledger.funds.fail_transfers = true;
        assert!(matches!(
            ledger.withdraw(&call(OWNER)),
            Err(LedgerError::WithdrawalFailed(_))
        ));
        assert_eq!(ledger.balance(), U256::from(MINIMUM));
    }

    #[test]
    fn owner_changes_minimum() {
        let mut ledger = ledger();
        assert_eq!(
            ledger.set_minimum_payment(&call(PAYER), U256::ZERO),
            Err(LedgerError::NotOwner(PAYER))
        );
        ledger.set_minimum_payment(&call(OWNER), U256::from(5u8)).unwrap();
        assert_eq!(ledger.minimum_payment(), U256::from(5u8));
        ledger.redeem_authorization(&call(PAYER), &redeem(5, 1)).unwrap();
    }
}
