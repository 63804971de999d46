//! An in-process ERC-3009 funds-holding token.
//!
//! [`Erc3009Token`] keeps balances and the `authorizationState` nonce set of
//! a USDC-style token and redeems signed authorizations atomically: the
//! payee check, the validity window, replay state, signature recovery, and
//! the balance check all pass before any state changes. Both window bounds
//! are inclusive.

use std::collections::{HashMap, HashSet};

use accessgate::authorization::SignedAuthorization;
use accessgate::error::{RedemptionError, TransferError};
use accessgate::ledger::FundsContract;
use accessgate::timestamp::UnixTimestamp;
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::Eip712Domain;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::TokenDomain;
use crate::signature::verify;
use crate::types::AuthorizationKind;

/// Balances and authorization state of one ERC-3009 token.
#[derive(Debug, Clone)]
pub struct Erc3009Token {
    domain: TokenDomain,
    separator: Eip712Domain,
    balances: HashMap<Address, U256>,
    used: HashSet<(Address, B256)>,
    total_supply: U256,
}

impl Erc3009Token {
    /// An empty token with the given domain.
    #[must_use]
    pub fn new(domain: TokenDomain) -> Self {
        let separator = domain.eip712();
        Self {
            domain,
            separator,
            balances: HashMap::new(),
            used: HashSet::new(),
            total_supply: U256::ZERO,
        }
    }

    /// Credits `amount` to `to` out of thin air, for genesis balances.
    pub fn mint(&mut self, to: Address, amount: U256) {
        *self.balances.entry(to).or_default() += amount;
        self.total_supply += amount;
    }

    /// Token contract address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.domain.verifying_contract
    }

    /// The EIP-712 domain authorizations are signed under.
    #[must_use]
    pub const fn domain(&self) -> &TokenDomain {
        &self.domain
    }

    /// Total minted supply.
    #[must_use]
    pub const fn total_supply(&self) -> U256 {
        self.total_supply
    }

    /// `authorizationState(authorizer, nonce)`: whether the nonce has been used.
    #[must_use]
    pub fn authorization_state(&self, authorizer: Address, nonce: B256) -> bool {
        self.used.contains(&(authorizer, nonce))
    }

    /// `transferWithAuthorization`: redeems a transfer authorization
    /// submitted by any relayer.
    ///
    /// # Errors
    ///
    /// Returns [`RedemptionError`] if any check fails; nothing changes then.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        from = %signed.authorization.from,
        nonce = %signed.authorization.nonce
    )))]
    pub fn transfer_with_authorization(
        &mut self,
        signed: &SignedAuthorization,
        now: UnixTimestamp,
    ) -> Result<(), RedemptionError> {
        self.redeem(AuthorizationKind::Transfer, signed, now)
    }

    fn redeem(
        &mut self,
        kind: AuthorizationKind,
        signed: &SignedAuthorization,
        now: UnixTimestamp,
    ) -> Result<(), RedemptionError> {
        let auth = &signed.authorization;
        if now < auth.valid_after {
            return Err(RedemptionError::AuthorizationNotYetValid);
        }
        if now > auth.valid_before {
            return Err(RedemptionError::AuthorizationExpired);
        }
        if self.authorization_state(auth.from, auth.nonce) {
            return Err(RedemptionError::AuthorizationUsed);
        }
        verify(kind, signed, &self.separator).map_err(|_| RedemptionError::SignatureInvalid)?;
        self.transfer(auth.from, auth.to, auth.value)
            .map_err(|err| match err {
                TransferError::InsufficientBalance {
                    available,
                    required,
                } => RedemptionError::InsufficientBalance {
                    available,
                    required,
                },
                TransferError::ZeroAddress => RedemptionError::InvalidRecipient,
            })?;
        self.used.insert((auth.from, auth.nonce));
        #[cfg(feature = "telemetry")]
        tracing::debug!(from = %auth.from, to = %auth.to, value = %auth.value, "authorization used");
        Ok(())
    }
}

impl FundsContract for Erc3009Token {
    fn receive_with_authorization(
        &mut self,
        caller: Address,
        signed: &SignedAuthorization,
        now: UnixTimestamp,
    ) -> Result<(), RedemptionError> {
        if caller != signed.authorization.to {
            return Err(RedemptionError::CallerMustBePayee);
        }
        self.redeem(AuthorizationKind::Receive, signed, now)
    }

    fn balance_of(&self, account: Address) -> U256 {
        self.balances.get(&account).copied().unwrap_or_default()
    }

    fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), TransferError> {
        if to.is_zero() {
            return Err(TransferError::ZeroAddress);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                available,
                required: amount,
            });
        }
        self.balances.insert(from, available - amount);
        *self.balances.entry(to).or_default() += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use accessgate::authorization::PaymentAuthorization;
    use accessgate::error::LedgerError;
    use accessgate::ledger::{Call, PullPaymentLedger};
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    use super::*;
    use crate::signature::to_vrs;
    use crate::types::signing_hash;

    const PAYER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const TOKEN: Address = Address::repeat_byte(0x99);
    const LEDGER: Address = Address::repeat_byte(0xAA);
    const OWNER: Address = Address::repeat_byte(0x01);
    const RELAYER: Address = Address::repeat_byte(0x0F);

    fn token(payer: Address, balance: u64) -> Erc3009Token {
        let mut token = Erc3009Token::new(TokenDomain::new("USDC", "2", 84532, TOKEN));
        token.mint(payer, U256::from(balance));
        token
    }

    fn sign(
        signer: &PrivateKeySigner,
        kind: AuthorizationKind,
        to: Address,
        value: u64,
        nonce: u8,
    ) -> SignedAuthorization {
        let authorization = PaymentAuthorization {
            from: signer.address(),
            to,
            value: U256::from(value),
            valid_after: UnixTimestamp::from_secs(100),
            valid_before: UnixTimestamp::from_secs(200),
            nonce: B256::repeat_byte(nonce),
        };
        let domain = TokenDomain::new("USDC", "2", 84532, TOKEN).eip712();
        let signature = signer
            .sign_hash_sync(&signing_hash(kind, &authorization, &domain))
            .unwrap();
        SignedAuthorization {
            authorization,
            signature: to_vrs(&signature),
        }
    }

    fn at(secs: u64) -> UnixTimestamp {
        UnixTimestamp::from_secs(secs)
    }

    #[test]
    fn relayed_transfer_moves_funds_once() {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let mut token = token(payer.address(), 1_000);
        let auth = sign(&payer, AuthorizationKind::Transfer, RELAYER, 400, 1);

        token.transfer_with_authorization(&auth, at(150)).unwrap();
        assert_eq!(token.balance_of(RELAYER), U256::from(400u16));
        assert!(token.authorization_state(payer.address(), B256::repeat_byte(1)));

        assert_eq!(
            token.transfer_with_authorization(&auth, at(150)),
            Err(RedemptionError::AuthorizationUsed)
        );
        assert_eq!(token.balance_of(payer.address()), U256::from(600u16));
        assert_eq!(token.balance_of(RELAYER), U256::from(400u16));
    }

    #[test]
    fn window_is_inclusive() {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let mut token = token(payer.address(), 1_000);

        let early = sign(&payer, AuthorizationKind::Transfer, RELAYER, 1, 1);
        assert_eq!(
            token.transfer_with_authorization(&early, at(99)),
            Err(RedemptionError::AuthorizationNotYetValid)
        );
        assert!(token.transfer_with_authorization(&early, at(100)).is_ok());

        let late = sign(&payer, AuthorizationKind::Transfer, RELAYER, 1, 2);
        assert_eq!(
            token.transfer_with_authorization(&late, at(201)),
            Err(RedemptionError::AuthorizationExpired)
        );
        assert!(token.transfer_with_authorization(&late, at(200)).is_ok());
    }

    #[test]
    fn forged_payer_is_rejected() {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let thief = PrivateKeySigner::random();
        let mut token = token(payer.address(), 1_000);

        let mut auth = sign(&thief, AuthorizationKind::Transfer, RELAYER, 500, 1);
        auth.authorization.from = payer.address();

        assert_eq!(
            token.transfer_with_authorization(&auth, at(150)),
            Err(RedemptionError::SignatureInvalid)
        );
        assert_eq!(token.balance_of(payer.address()), U256::from(1_000u16));
    }

    #[test]
    fn receive_requires_payee_caller() {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let mut token = token(payer.address(), 1_000);
        let auth = sign(&payer, AuthorizationKind::Receive, LEDGER, 10, 1);

        assert_eq!(
            token.receive_with_authorization(RELAYER, &auth, at(150)),
            Err(RedemptionError::CallerMustBePayee)
        );
        // A receive authorization cannot be relayed as a transfer.
        assert_eq!(
            token.transfer_with_authorization(&auth, at(150)),
            Err(RedemptionError::SignatureInvalid)
        );
        assert!(token.receive_with_authorization(LEDGER, &auth, at(150)).is_ok());
    }

    #[test]
    fn insufficient_balance_leaves_nonce_unused() {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let mut token = token(payer.address(), 5);
        let auth = sign(&payer, AuthorizationKind::Transfer, RELAYER, 10, 1);

        assert_eq!(
            token.transfer_with_authorization(&auth, at(150)),
            Err(RedemptionError::InsufficientBalance {
                available: U256::from(5u8),
                required: U256::from(10u8),
            })
        );
        assert!(!token.authorization_state(payer.address(), B256::repeat_byte(1)));
    }

    #[test]
    fn zero_recipient_is_an_invalid_recipient() {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let mut token = token(payer.address(), 1_000);
        let auth = sign(&payer, AuthorizationKind::Transfer, Address::ZERO, 10, 1);

        assert_eq!(
            token.transfer_with_authorization(&auth, at(150)),
            Err(RedemptionError::InvalidRecipient)
        );
        assert!(!token.authorization_state(payer.address(), B256::repeat_byte(1)));
        assert_eq!(token.balance_of(payer.address()), U256::from(1_000u16));
    }

    #[test]
    fn pull_ledger_redeems_and_issues() {
        let payer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let mut ledger = PullPaymentLedger::new(
            LEDGER,
            OWNER,
            U256::from(100u8),
            token(payer.address(), 1_000),
        );
        let auth = sign(&payer, AuthorizationKind::Receive, LEDGER, 250, 1);
        let call = Call::new(RELAYER, at(150));

        ledger.redeem_authorization(&call, &auth.redeem_call()).unwrap();
        assert!(ledger.is_eligible(payer.address()));
        assert_eq!(ledger.balance(), U256::from(250u16));

        // Replaying the same authorization changes nothing.
        assert_eq!(
            ledger.redeem_authorization(&call, &auth.redeem_call()),
            Err(LedgerError::Redemption(RedemptionError::AuthorizationUsed))
        );
        assert_eq!(ledger.balance(), U256::from(250u16));

        let id = ledger
            .mint_access_credential(&Call::new(payer.address(), at(151)))
            .unwrap();
        assert_eq!(id, U256::from(1u8));

        assert_eq!(ledger.withdraw(&Call::new(OWNER, at(152))), Ok(U256::from(250u16)));
        assert_eq!(ledger.funds().balance_of(OWNER), U256::from(250u16));
    }
}
