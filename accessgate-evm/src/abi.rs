//! ABI encoding of ledger calls, reverts, and events.
//!
//! Maps the chain-agnostic ledger types onto the [`IAccessLedger`] and
//! [`IFundsToken`] interfaces so they can be submitted to, or decoded from,
//! a deployed contract.

use accessgate::authorization::{RedeemAuthorization, SignedAuthorization};
use accessgate::error::{CredentialKey, LedgerError, RedemptionError, TransferError};
use accessgate::ledger::LedgerEvent;
use accessgate::timestamp::UnixTimestamp;
use alloy_primitives::{Address, B256, Bytes, Log, U256, keccak256};
use alloy_sol_types::{SolCall, SolError, SolEvent, SolInterface};

use crate::contract::IAccessLedger::{self, IAccessLedgerErrors};
use crate::contract::IFundsToken::{self, IFundsTokenErrors};
use crate::types::AuthorizationKind;

/// Errors decoding ABI data.
#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    /// The bytes do not decode as the expected ABI type.
    #[error("ABI decode failed: {0}")]
    Decode(#[from] alloy_sol_types::Error),
    /// A timestamp argument does not fit in 64 bits.
    #[error("Timestamp {0} out of range")]
    TimestampOverflow(U256),
}

/// Revert data a contract would return for `error`.
#[must_use]
pub fn revert_data(error: &LedgerError) -> Bytes {
    use IAccessLedger as L;
    let encoded = match error {
        LedgerError::PaymentBelowMinimum { sent, required } => L::PaymentBelowMinimum {
            sent: *sent,
            required: *required,
        }
        .abi_encode(),
        LedgerError::NotWhitelisted(account) => L::NotWhitelisted { account: *account }.abi_encode(),
        LedgerError::AlreadyMinted(CredentialKey::Holder(account)) => {
            L::AlreadyMinted { account: *account }.abi_encode()
        }
        LedgerError::AlreadyMinted(CredentialKey::Reference(id)) => {
            L::ReferenceAlreadyMinted { referenceId: *id }.abi_encode()
        }
        LedgerError::NothingToWithdraw => L::NothingToWithdraw {}.abi_encode(),
        LedgerError::WithdrawalFailed(reason) => L::WithdrawalFailed {
            reason: transfer_revert_data(reason),
        }
        .abi_encode(),
        LedgerError::NotAdmin(account) => L::NotAdmin { account: *account }.abi_encode(),
        LedgerError::NotOwner(account) => L::NotOwner { account: *account }.abi_encode(),
        LedgerError::InvalidRecipient => L::InvalidRecipient {}.abi_encode(),
        LedgerError::InvalidReferenceId => L::InvalidReferenceId {}.abi_encode(),
        LedgerError::NonexistentCredential(id) => {
            L::NonexistentCredential { tokenId: *id }.abi_encode()
        }
        LedgerError::Redemption(err) => redemption_revert(err),
    };
    encoded.into()
}

fn redemption_revert(error: &RedemptionError) -> Vec<u8> {
    use IAccessLedger as L;
    match error {
        RedemptionError::SignatureInvalid => L::SignatureInvalid {}.abi_encode(),
        RedemptionError::AuthorizationUsed => L::AuthorizationUsed {}.abi_encode(),
        RedemptionError::AuthorizationNotYetValid => L::AuthorizationNotYetValid {}.abi_encode(),
        RedemptionError::AuthorizationExpired => L::AuthorizationExpired {}.abi_encode(),
        RedemptionError::CallerMustBePayee => L::CallerMustBePayee {}.abi_encode(),
        RedemptionError::InvalidRecipient => L::AuthorizationToZeroAddress {}.abi_encode(),
        RedemptionError::InsufficientBalance {
            available,
            required,
        } => L::InsufficientBalance {
            available: *available,
            required: *required,
        }
        .abi_encode(),
    }
}

fn transfer_revert_data(error: &TransferError) -> Bytes {
    let encoded = match error {
        TransferError::InsufficientBalance {
            available,
            required,
        } => IFundsToken::TransferAmountExceedsBalance {
            available: *available,
            required: *required,
        }
        .abi_encode(),
        TransferError::ZeroAddress => IFundsToken::TransferToZeroAddress {}.abi_encode(),
    };
    encoded.into()
}

/// Decodes ledger revert data back into a [`LedgerError`].
///
/// # Errors
///
/// Returns [`AbiError::Decode`] for an unknown selector or malformed data,
/// including a `WithdrawalFailed` whose inner reason is not a token error.
pub fn decode_revert(data: &[u8]) -> Result<LedgerError, AbiError> {
    let error = match IAccessLedgerErrors::abi_decode(data)? {
        IAccessLedgerErrors::PaymentBelowMinimum(e) => LedgerError::PaymentBelowMinimum {
            sent: e.sent,
            required: e.required,
        },
        IAccessLedgerErrors::NotWhitelisted(e) => LedgerError::NotWhitelisted(e.account),
        IAccessLedgerErrors::AlreadyMinted(e) => {
            LedgerError::AlreadyMinted(CredentialKey::Holder(e.account))
        }
        IAccessLedgerErrors::ReferenceAlreadyMinted(e) => {
            LedgerError::AlreadyMinted(CredentialKey::Reference(e.referenceId))
        }
        IAccessLedgerErrors::NothingToWithdraw(_) => LedgerError::NothingToWithdraw,
        IAccessLedgerErrors::WithdrawalFailed(e) => {
            let reason = match IFundsTokenErrors::abi_decode(&e.reason)? {
                IFundsTokenErrors::TransferAmountExceedsBalance(t) => {
                    TransferError::InsufficientBalance {
                        available: t.available,
                        required: t.required,
                    }
                }
                IFundsTokenErrors::TransferToZeroAddress(_) => TransferError::ZeroAddress,
            };
            LedgerError::WithdrawalFailed(reason)
        }
        IAccessLedgerErrors::NotAdmin(e) => LedgerError::NotAdmin(e.account),
        IAccessLedgerErrors::NotOwner(e) => LedgerError::NotOwner(e.account),
        IAccessLedgerErrors::InvalidRecipient(_) => LedgerError::InvalidRecipient,
        IAccessLedgerErrors::InvalidReferenceId(_) => LedgerError::InvalidReferenceId,
        IAccessLedgerErrors::NonexistentCredential(e) => {
            LedgerError::NonexistentCredential(e.tokenId)
        }
        IAccessLedgerErrors::SignatureInvalid(_) => RedemptionError::SignatureInvalid.into(),
        IAccessLedgerErrors::AuthorizationUsed(_) => RedemptionError::AuthorizationUsed.into(),
        IAccessLedgerErrors::AuthorizationNotYetValid(_) => {
            RedemptionError::AuthorizationNotYetValid.into()
        }
        IAccessLedgerErrors::AuthorizationExpired(_) => {
            RedemptionError::AuthorizationExpired.into()
        }
        IAccessLedgerErrors::CallerMustBePayee(_) => RedemptionError::CallerMustBePayee.into(),
        IAccessLedgerErrors::AuthorizationToZeroAddress(_) => {
            RedemptionError::InvalidRecipient.into()
        }
        IAccessLedgerErrors::InsufficientBalance(e) => RedemptionError::InsufficientBalance {
            available: e.available,
            required: e.required,
        }
        .into(),
    };
    Ok(error)
}

/// `redeemAuthorization` calldata.
#[must_use]
pub fn redeem_calldata(call: &RedeemAuthorization) -> Bytes {
    IAccessLedger::redeemAuthorizationCall {
        from: call.from,
        value: call.value,
        validAfter: U256::from(call.valid_after.as_secs()),
        validBefore: U256::from(call.valid_before.as_secs()),
        nonce: call.nonce,
        v: call.v,
        r: call.r,
        s: call.s,
    }
    .abi_encode()
    .into()
}

/// Decodes `redeemAuthorization` calldata.
///
/// # Errors
///
/// Returns [`AbiError`] on a selector mismatch, malformed data, or a
/// timestamp beyond `u64`.
pub fn decode_redeem_calldata(data: &[u8]) -> Result<RedeemAuthorization, AbiError> {
    let call = IAccessLedger::redeemAuthorizationCall::abi_decode(data)?;
    Ok(RedeemAuthorization {
        from: call.from,
        value: call.value,
        valid_after: timestamp(call.validAfter)?,
        valid_before: timestamp(call.validBefore)?,
        nonce: call.nonce,
        v: call.v,
        r: call.r,
        s: call.s,
    })
}

fn timestamp(value: U256) -> Result<UnixTimestamp, AbiError> {
    u64::try_from(value)
        .map(UnixTimestamp::from_secs)
        .map_err(|_| AbiError::TimestampOverflow(value))
}

/// Token calldata that settles `signed` as `kind`.
#[must_use]
pub fn settlement_calldata(kind: AuthorizationKind, signed: &SignedAuthorization) -> Bytes {
    let auth = &signed.authorization;
    let sig = &signed.signature;
    let valid_after = U256::from(auth.valid_after.as_secs());
    let valid_before = U256::from(auth.valid_before.as_secs());
    let encoded = match kind {
        AuthorizationKind::Transfer => IFundsToken::transferWithAuthorizationCall {
            from: auth.from,
            to: auth.to,
            value: auth.value,
            validAfter: valid_after,
            validBefore: valid_before,
            nonce: auth.nonce,
            v: sig.v,
            r: sig.r,
            s: sig.s,
        }
        .abi_encode(),
        AuthorizationKind::Receive => IFundsToken::receiveWithAuthorizationCall {
            from: auth.from,
            to: auth.to,
            value: auth.value,
            validAfter: valid_after,
            validBefore: valid_before,
            nonce: auth.nonce,
            v: sig.v,
            r: sig.r,
            s: sig.s,
        }
        .abi_encode(),
    };
    encoded.into()
}

/// Stable identifier of a settled payment: the keccak-256 of its settlement
/// calldata. Distinct authorizations never share an identifier because the
/// nonce is part of the hashed data.
#[must_use]
pub fn payment_tx_hash(kind: AuthorizationKind, signed: &SignedAuthorization) -> B256 {
    keccak256(settlement_calldata(kind, signed))
}

/// The log `emitter` would produce for `event`.
#[must_use]
pub fn event_log(emitter: Address, event: &LedgerEvent) -> Log {
    use IAccessLedger as L;
    let data = match event {
        LedgerEvent::PaymentReceived {
            payer,
            amount,
            nonce,
        } => L::PaymentReceived {
            payer: *payer,
            amount: *amount,
            nonce: *nonce,
        }
        .encode_log_data(),
        LedgerEvent::NftMinted {
            recipient,
            token_id,
        } => L::NFTMinted {
            recipient: *recipient,
            tokenId: *token_id,
        }
        .encode_log_data(),
        LedgerEvent::CredentialLinked {
            token_id,
            reference_id,
        } => L::CredentialLinked {
            tokenId: *token_id,
            referenceId: *reference_id,
        }
        .encode_log_data(),
        LedgerEvent::Withdrawal { owner, amount } => L::Withdrawal {
            owner: *owner,
            amount: *amount,
        }
        .encode_log_data(),
        LedgerEvent::AdminChanged { previous, new } => L::AdminChanged {
            previous: *previous,
            current: *new,
        }
        .encode_log_data(),
        LedgerEvent::OwnershipTransferred { previous, new } => L::OwnershipTransferred {
            previous: *previous,
            current: *new,
        }
        .encode_log_data(),
        LedgerEvent::BaseUriChanged { uri } => L::BaseURIChanged { uri: uri.clone() }.encode_log_data(),
        LedgerEvent::MinimumPaymentChanged { previous, new } => L::MinimumPaymentChanged {
            previous: *previous,
            current: *new,
        }
        .encode_log_data(),
    };
    Log {
        address: emitter,
        data,
    }
}

#[cfg(test)]
mod tests {
    use accessgate::authorization::{PaymentAuthorization, VrsSignature};

    use super::*;

    fn signed(nonce: u8) -> SignedAuthorization {
        SignedAuthorization {
            authorization: PaymentAuthorization {
                from: Address::repeat_byte(1),
                to: Address::repeat_byte(2),
                value: U256::from(1_000u16),
                valid_after: UnixTimestamp::from_secs(10),
                valid_before: UnixTimestamp::from_secs(20),
                nonce: B256::repeat_byte(nonce),
            },
            signature: VrsSignature {
                v: 27,
                r: B256::repeat_byte(0xAB),
                s: B256::repeat_byte(0xCD),
            },
        }
    }

    #[test]
    fn reverts_decode_to_the_same_error() {
        let errors = [
            LedgerError::PaymentBelowMinimum {
                sent: U256::from(1u8),
                required: U256::from(5u8),
            },
            LedgerError::AlreadyMinted(CredentialKey::Holder(Address::repeat_byte(3))),
            LedgerError::AlreadyMinted(CredentialKey::Reference(U256::from(42u8))),
            LedgerError::Redemption(RedemptionError::AuthorizationUsed),
            LedgerError::Redemption(RedemptionError::InvalidRecipient),
            LedgerError::InvalidRecipient,
        ];
        for error in errors {
            assert_eq!(decode_revert(&revert_data(&error)).unwrap(), error);
        }
    }

    #[test]
    fn withdrawal_revert_carries_token_reason() {
        let error = LedgerError::WithdrawalFailed(TransferError::InsufficientBalance {
            available: U256::ZERO,
            required: U256::from(7u8),
        });
        let data = revert_data(&error);
        assert_eq!(&data[..4], IAccessLedger::WithdrawalFailed::SELECTOR.as_slice());
        assert_eq!(decode_revert(&data).unwrap(), error);
    }

    #[test]
    fn unknown_selector_is_rejected() {
        assert!(matches!(
            decode_revert(&[0xde, 0xad, 0xbe, 0xef]),
            Err(AbiError::Decode(_))
        ));
    }

    #[test]
    fn redeem_calldata_decodes() {
        let call = signed(1).redeem_call();
        let data = redeem_calldata(&call);
        assert_eq!(
            &data[..4],
            IAccessLedger::redeemAuthorizationCall::SELECTOR.as_slice()
        );
        assert_eq!(decode_redeem_calldata(&data).unwrap(), call);
    }

    #[test]
    fn view_calls_decode() {
        let account = Address::repeat_byte(5);
        let data = IAccessLedger::canMintCall { account }.abi_encode();
        assert_eq!(&data[..4], IAccessLedger::canMintCall::SELECTOR.as_slice());
        assert_eq!(
            IAccessLedger::canMintCall::abi_decode(&data).unwrap().account,
            account
        );
        let returns = IAccessLedger::canMintCall::abi_encode_returns(&true);
        assert!(IAccessLedger::canMintCall::abi_decode_returns(&returns).unwrap());

        let data = IAccessLedger::getBalanceCall {}.abi_encode();
        assert_eq!(data.as_slice(), IAccessLedger::getBalanceCall::SELECTOR.as_slice());
        assert!(IAccessLedger::getBalanceCall::abi_decode(&data).is_ok());
        let balance = U256::from(250u16);
        let returns = IAccessLedger::getBalanceCall::abi_encode_returns(&balance);
        assert_eq!(
            IAccessLedger::getBalanceCall::abi_decode_returns(&returns).unwrap(),
            balance
        );
    }

    #[test]
    fn tx_hash_depends_on_nonce_and_kind() {
        let a = payment_tx_hash(AuthorizationKind::Receive, &signed(1));
        assert_eq!(a, payment_tx_hash(AuthorizationKind::Receive, &signed(1)));
        assert_ne!(a, payment_tx_hash(AuthorizationKind::Receive, &signed(2)));
        assert_ne!(a, payment_tx_hash(AuthorizationKind::Transfer, &signed(1)));
    }

    #[test]
    fn mint_event_indexes_recipient_and_id() {
        let emitter = Address::repeat_byte(0xEE);
        let log = event_log(
            emitter,
            &LedgerEvent::NftMinted {
                recipient: Address::repeat_byte(4),
                token_id: U256::from(9u8),
            },
        );
        assert_eq!(log.address, emitter);
        let topics = log.data.topics();
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0], IAccessLedger::NFTMinted::SIGNATURE_HASH);
        assert_eq!(topics[2], B256::from(U256::from(9u8)));
    }
}
