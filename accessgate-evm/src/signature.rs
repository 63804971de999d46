//! Splitting, joining, and recovering authorization signatures.

use accessgate::authorization::{SignedAuthorization, VrsSignature};
use alloy_primitives::{Address, B256, Signature, U256};
use alloy_sol_types::Eip712Domain;

use crate::types::{AuthorizationKind, signing_hash};

/// Errors from parsing or checking a signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// The bytes are not a 65-byte signature with a valid recovery id.
    #[error("Malformed signature: {0}")]
    Malformed(String),
    /// `v` is neither 27/28 nor 0/1.
    #[error("Invalid recovery id {0}")]
    InvalidRecoveryId(u8),
    /// Public key recovery failed.
    #[error("Signature recovery failed")]
    Recovery,
    /// The signature recovers to someone other than the payer.
    #[error("Signature recovers to {recovered}, expected {expected}")]
    SignerMismatch {
        /// The payer.
        expected: Address,
        /// The recovered address.
        recovered: Address,
    },
}

/// Splits a signature into on-chain `(v, r, s)` form, `v` in `{27, 28}`.
#[must_use]
pub fn to_vrs(signature: &Signature) -> VrsSignature {
    VrsSignature {
        v: 27 + u8::from(signature.v()),
        r: B256::from(signature.r().to_be_bytes::<32>()),
        s: B256::from(signature.s().to_be_bytes::<32>()),
    }
}

/// Joins `(v, r, s)` back into a signature.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidRecoveryId`] for an unknown `v`.
pub fn from_vrs(vrs: &VrsSignature) -> Result<Signature, SignatureError> {
    let parity = match vrs.v {
        0 | 27 => false,
        1 | 28 => true,
        other => return Err(SignatureError::InvalidRecoveryId(other)),
    };
    Ok(Signature::new(
        U256::from_be_bytes(vrs.r.0),
        U256::from_be_bytes(vrs.s.0),
        parity,
    ))
}

/// Recovers the address that signed `signed` as `kind` under `domain`.
///
/// # Errors
///
/// Returns [`SignatureError`] if the signature cannot be parsed or recovered.
pub fn recover_signer(
    kind: AuthorizationKind,
    signed: &SignedAuthorization,
    domain: &Eip712Domain,
) -> Result<Address, SignatureError> {
    let hash = signing_hash(kind, &signed.authorization, domain);
    from_vrs(&signed.signature)?
        .recover_address_from_prehash(&hash)
        .map_err(|_| SignatureError::Recovery)
}

/// Checks that `signed` was signed by its payer.
///
/// # Errors
///
/// Returns [`SignatureError::SignerMismatch`] if another key signed it, or
/// any error from [`recover_signer`].
pub fn verify(
    kind: AuthorizationKind,
    signed: &SignedAuthorization,
    domain: &Eip712Domain,
) -> Result<(), SignatureError> {
    let expected = signed.authorization.from;
    let recovered = recover_signer(kind, signed, domain)?;
    if recovered == expected {
        Ok(())
    } else {
        Err(SignatureError::SignerMismatch {
            expected,
            recovered,
        })
    }
}

#[cfg(test)]
mod tests {
    use accessgate::authorization::PaymentAuthorization;
    use accessgate::timestamp::UnixTimestamp;
    use alloy_signer::SignerSync;
    use alloy_signer_local::PrivateKeySigner;

    use super::*;
    use crate::chain::TokenDomain;

    const PAYER_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn signed_by(signer: &PrivateKeySigner, kind: AuthorizationKind) -> (SignedAuthorization, Eip712Domain) {
        let domain = TokenDomain::new("USDC", "2", 84532, Address::repeat_byte(9)).eip712();
        let authorization = PaymentAuthorization {
            from: signer.address(),
            to: Address::repeat_byte(2),
            value: U256::from(5u8),
            valid_after: UnixTimestamp::from_secs(0),
            valid_before: UnixTimestamp::from_secs(100),
            nonce: B256::repeat_byte(7),
        };
        let signature = signer
            .sign_hash_sync(&signing_hash(kind, &authorization, &domain))
            .unwrap();
        (
            SignedAuthorization {
                authorization,
                signature: to_vrs(&signature),
            },
            domain,
        )
    }

    #[test]
    fn vrs_round_trip_recovers_payer() {
        let signer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let (signed, domain) = signed_by(&signer, AuthorizationKind::Receive);
        assert!(matches!(signed.signature.v, 27 | 28));
        assert_eq!(
            recover_signer(AuthorizationKind::Receive, &signed, &domain),
            Ok(signer.address())
        );
        assert!(verify(AuthorizationKind::Receive, &signed, &domain).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let signer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let (mut signed, domain) = signed_by(&signer, AuthorizationKind::Transfer);
        signed.authorization.value = U256::from(500u16);
        assert!(matches!(
            verify(AuthorizationKind::Transfer, &signed, &domain),
            Err(SignatureError::SignerMismatch { .. } | SignatureError::Recovery)
        ));
    }

    #[test]
    fn wrong_primary_type_fails_verification() {
        let signer: PrivateKeySigner = PAYER_KEY.parse().unwrap();
        let (signed, domain) = signed_by(&signer, AuthorizationKind::Transfer);
        assert!(verify(AuthorizationKind::Receive, &signed, &domain).is_err());
    }

    #[test]
    fn rejects_unknown_recovery_id() {
        let vrs = VrsSignature {
            v: 29,
            r: B256::ZERO,
            s: B256::ZERO,
        };
        assert_eq!(from_vrs(&vrs), Err(SignatureError::InvalidRecoveryId(29)));
    }
}
