//! Signed payment authorizations.
//!
//! A [`PaymentAuthorization`] is the chain-agnostic form of an ERC-3009
//! authorization: a signed, time-bounded, nonce-scoped instruction permitting
//! a one-time pull of `value` from `from` to `to`. Signing and signature
//! recovery live in the chain binding (`accessgate-evm`); this module holds
//! the data and the redemption call shape.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

use crate::timestamp::UnixTimestamp;

/// The structured authorization data that is signed by the payer.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    /// The payer.
    pub from: Address,
    /// The payee.
    pub to: Address,
    /// Amount in the token's smallest unit.
    #[serde_as(as = "DisplayFromStr")]
    pub value: U256,
    /// Not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// Not valid after this timestamp (inclusive).
    pub valid_before: UnixTimestamp,
    /// Unique 32-byte nonce; each (payer, nonce) pair can be redeemed once.
    pub nonce: B256,
}

impl PaymentAuthorization {
    /// Whether `now` lies inside the validity window.
    #[must_use]
    pub fn is_valid_at(&self, now: UnixTimestamp) -> bool {
        now.within(self.valid_after, self.valid_before)
    }
}

/// A secp256k1 signature split into its on-chain `(v, r, s)` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrsSignature {
    /// Recovery id, 27 or 28.
    pub v: u8,
    /// Signature `r` component.
    pub r: B256,
    /// Signature `s` component.
    pub s: B256,
}

/// An authorization together with the payer's signature over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedAuthorization {
    /// The signed message.
    pub authorization: PaymentAuthorization,
    /// The payer's signature.
    pub signature: VrsSignature,
}

impl SignedAuthorization {
    /// The `redeemAuthorization` call carrying this authorization.
    ///
    /// The payee is implied by the ledger receiving the call.
    #[must_use]
    pub const fn redeem_call(&self) -> RedeemAuthorization {
        let auth = &self.authorization;
        RedeemAuthorization {
            from: auth.from,
            value: auth.value,
            valid_after: auth.valid_after,
            valid_before: auth.valid_before,
            nonce: auth.nonce,
            v: self.signature.v,
            r: self.signature.r,
            s: self.signature.s,
        }
    }
}

/// Arguments of `redeemAuthorization(from, value, validAfter, validBefore, nonce, v, r, s)`.
///
/// Field order mirrors the on-ledger parameter order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeemAuthorization {
    /// The payer.
    pub from: Address,
    /// Amount in the token's smallest unit.
    pub value: U256,
    /// Not valid before this timestamp.
    pub valid_after: UnixTimestamp,
    /// Not valid after this timestamp.
    pub valid_before: UnixTimestamp,
    /// Authorization nonce.
    pub nonce: B256,
    /// Signature recovery id.
    pub v: u8,
    /// Signature `r`.
    pub r: B256,
    /// Signature `s`.
    pub s: B256,
}

impl RedeemAuthorization {
    /// Rebuilds the signed authorization with `payee` as the recipient.
    #[must_use]
    pub const fn with_payee(&self, payee: Address) -> SignedAuthorization {
        SignedAuthorization {
            authorization: PaymentAuthorization {
                from: self.from,
                to: payee,
                value: self.value,
                valid_after: self.valid_after,
                valid_before: self.valid_before,
                nonce: self.nonce,
            },
            signature: VrsSignature {
                v: self.v,
                r: self.r,
                s: self.s,
            },
        }
    }
}

/// Result of asking a user-mediated signer for a signature.
///
/// Declining is an expected outcome, not a failure, and is never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignOutcome<T> {
    /// The payer signed.
    Signed(T),
    /// The payer declined to sign.
    Cancelled,
}

impl<T> SignOutcome<T> {
    /// Maps the signed value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> SignOutcome<U> {
        match self {
            Self::Signed(value) => SignOutcome::Signed(f(value)),
            Self::Cancelled => SignOutcome::Cancelled,
        }
    }

    /// Returns the signed value, if any.
    pub fn signed(self) -> Option<T> {
        match self {
            Self::Signed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    /// Whether the payer declined.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SignedAuthorization {
        SignedAuthorization {
            authorization: PaymentAuthorization {
                from: Address::repeat_byte(0x11),
                to: Address::repeat_byte(0x22),
                value: U256::from(1_000_000u64),
                valid_after: UnixTimestamp::from_secs(10),
                valid_before: UnixTimestamp::from_secs(20),
                nonce: B256::repeat_byte(0x33),
            },
            signature: VrsSignature {
                v: 27,
                r: B256::repeat_byte(0x44),
                s: B256::repeat_byte(0x55),
            },
        }
    }

    #[test]
    fn redeem_call_preserves_fields() {
        let signed = sample();
        let call = signed.redeem_call();
        assert_eq!(call.from, signed.authorization.from);
        assert_eq!(call.nonce, signed.authorization.nonce);
        assert_eq!(call.with_payee(signed.authorization.to), signed);
    }

    #[test]
    fn value_serializes_as_decimal_string() {
        let json = serde_json::to_value(sample().authorization).unwrap();
        assert_eq!(json["value"], "1000000");
        assert_eq!(json["validAfter"], "10");
    }

    #[test]
    fn sign_outcome_helpers() {
        let signed = SignOutcome::Signed(2).map(|v| v * 2);
        assert_eq!(signed.clone().signed(), Some(4));
        assert!(SignOutcome::<u8>::Cancelled.is_cancelled());
        assert!(!signed.is_cancelled());
    }
}
