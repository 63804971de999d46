//! EIP-712 typed authorizations and the transport bundle.
//!
//! A payment authorization is signed as one of two ERC-3009 primary types.
//! `TransferWithAuthorization` can be submitted by any relayer;
//! `ReceiveWithAuthorization` can only be submitted by the payee, which is
//! how the pull-payment ledger redeems it. Both hash the same six fields.

use accessgate::authorization::{PaymentAuthorization, SignedAuthorization};
use accessgate::encoding::{TransportDecodeError, decode_json, encode_json};
use alloy_primitives::{Address, B256, Bytes, Signature, U256};
use alloy_sol_types::{Eip712Domain, SolStruct, sol};
use serde::{Deserialize, Serialize};

use crate::chain::{ChainId, parse_caip2};
use crate::signature::{SignatureError, to_vrs};

sol!(
    /// ERC-3009 `TransferWithAuthorization` typed data.
    #[derive(Serialize, Deserialize)]
    struct TransferWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

sol!(
    /// ERC-3009 `ReceiveWithAuthorization` typed data.
    #[derive(Serialize, Deserialize)]
    struct ReceiveWithAuthorization {
        address from;
        address to;
        uint256 value;
        uint256 validAfter;
        uint256 validBefore;
        bytes32 nonce;
    }
);

/// Which ERC-3009 primary type an authorization is signed as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AuthorizationKind {
    /// `transferWithAuthorization`, relayable by anyone.
    Transfer,
    /// `receiveWithAuthorization`, submitted by the payee.
    #[default]
    Receive,
}

/// The EIP-712 signing hash of `authorization` under `domain`.
#[must_use]
pub fn signing_hash(
    kind: AuthorizationKind,
    authorization: &PaymentAuthorization,
    domain: &Eip712Domain,
) -> B256 {
    let valid_after = U256::from(authorization.valid_after.as_secs());
    let valid_before = U256::from(authorization.valid_before.as_secs());
    match kind {
        AuthorizationKind::Transfer => TransferWithAuthorization {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value,
            validAfter: valid_after,
            validBefore: valid_before,
            nonce: authorization.nonce,
        }
        .eip712_signing_hash(domain),
        AuthorizationKind::Receive => ReceiveWithAuthorization {
            from: authorization.from,
            to: authorization.to,
            value: authorization.value,
            validAfter: valid_after,
            validBefore: valid_before,
            nonce: authorization.nonce,
        }
        .eip712_signing_hash(domain),
    }
}

/// A signed authorization as it travels between client and server:
/// base64-encoded JSON of `{message, signature, network}` plus the token
/// and primary type needed to verify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationBundle {
    /// The signed message.
    pub message: PaymentAuthorization,
    /// 65-byte `r || s || v` signature.
    pub signature: Bytes,
    /// CAIP-2 network identifier.
    pub network: String,
    /// Token contract the authorization is redeemed against.
    pub token: Address,
    /// Primary type the message was signed as.
    #[serde(default)]
    pub kind: AuthorizationKind,
}

impl AuthorizationBundle {
    /// Bundles a signature produced over `message`.
    #[must_use]
    pub fn new(
        message: PaymentAuthorization,
        signature: &Signature,
        network: String,
        token: Address,
        kind: AuthorizationKind,
    ) -> Self {
        Self {
            message,
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
            network,
            token,
            kind,
        }
    }

    /// Base64 JSON transport form.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        encode_json(self)
    }

    /// Parses the base64 JSON transport form.
    ///
    /// # Errors
    ///
    /// Returns [`TransportDecodeError`] on malformed input.
    pub fn decode(encoded: &str) -> Result<Self, TransportDecodeError> {
        decode_json(encoded)
    }

    /// Chain ID named by [`AuthorizationBundle::network`].
    #[must_use]
    pub fn chain_id(&self) -> Option<ChainId> {
        parse_caip2(&self.network)
    }

    /// The signature as a recoverable secp256k1 signature.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Malformed`] unless the signature is 65 bytes
    /// with a valid recovery id.
    pub fn parsed_signature(&self) -> Result<Signature, SignatureError> {
        Signature::from_raw(&self.signature).map_err(|e| SignatureError::Malformed(e.to_string()))
    }

    /// The message with its signature split into `(v, r, s)`.
    ///
    /// # Errors
    ///
    /// Same as [`AuthorizationBundle::parsed_signature`].
    pub fn signed(&self) -> Result<SignedAuthorization, SignatureError> {
        Ok(SignedAuthorization {
            authorization: self.message,
            signature: to_vrs(&self.parsed_signature()?),
        })
    }
}
