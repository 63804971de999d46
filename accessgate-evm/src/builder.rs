//! Client-side authorization building and signing.
//!
//! [`AuthorizationBuilder`] turns an [`AuthorizationRequest`] into a signed,
//! transport-ready [`AuthorizationBundle`]: it picks a fresh random nonce and
//! a validity window, hashes the message under the token's EIP-712 domain,
//! and asks the payer's key for a signature. A payer who declines yields
//! [`SignOutcome::Cancelled`], which is not an error.

use std::future::Future;
use std::sync::Arc;

use accessgate::authorization::{PaymentAuthorization, SignOutcome};
use accessgate::error::AuthorizationError;
use accessgate::retry::PaymentSource;
use accessgate::timestamp::UnixTimestamp;
use alloy_primitives::{Address, B256, Signature, U256};
use alloy_signer_local::PrivateKeySigner;
use rand::RngExt;
use rand::rng;
#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::chain::{ChainId, TokenDomain, caip2};
use crate::types::{AuthorizationBundle, AuthorizationKind, signing_hash};

/// Default validity window length in seconds.
pub const DEFAULT_VALIDITY_SECS: u64 = 3_600;

/// A key that can sign authorization hashes on the payer's behalf.
///
/// Wallet-backed implementations prompt the user and return
/// [`SignOutcome::Cancelled`] when the user declines.
pub trait SignerLike: Send + Sync {
    /// Address of the signing key.
    fn address(&self) -> Address;

    /// Signs a 32-byte prehash.
    fn sign_hash(
        &self,
        hash: &B256,
    ) -> impl Future<Output = Result<SignOutcome<Signature>, alloy_signer::Error>> + Send;
}

impl SignerLike for PrivateKeySigner {
    fn address(&self) -> Address {
        Self::address(self)
    }

    async fn sign_hash(&self, hash: &B256) -> Result<SignOutcome<Signature>, alloy_signer::Error> {
        alloy_signer::Signer::sign_hash(self, hash)
            .await
            .map(SignOutcome::Signed)
    }
}

impl<T: SignerLike> SignerLike for Arc<T> {
    fn address(&self) -> Address {
        (**self).address()
    }

    async fn sign_hash(&self, hash: &B256) -> Result<SignOutcome<Signature>, alloy_signer::Error> {
        (**self).sign_hash(hash).await
    }
}

/// Errors building an authorization. Declining to sign is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No signing key is available.
    #[error("No signer available")]
    NoSigner,
    /// The requested payer is not the signing key.
    #[error("Requested payer {requested} but signer is {signer}")]
    PayerMismatch {
        /// Payer named in the request.
        requested: Address,
        /// Address of the signing key.
        signer: Address,
    },
    /// `valid_before` is not after `valid_after`.
    #[error("Empty validity window {valid_after}..{valid_before}")]
    EmptyWindow {
        /// Window start.
        valid_after: UnixTimestamp,
        /// Window end.
        valid_before: UnixTimestamp,
    },
    /// The token is not a known deployment and no domain was supplied.
    #[error("Unknown token {token} on chain {chain_id}")]
    UnknownToken {
        /// Chain the token was requested on.
        chain_id: ChainId,
        /// Token address.
        token: Address,
    },
    /// The signer failed.
    #[error("Signing failed: {0}")]
    Signing(#[from] alloy_signer::Error),
    /// The bundle could not be serialized.
    #[error("Failed to encode authorization: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<BuildError> for AuthorizationError {
    fn from(err: BuildError) -> Self {
        Self::Build(err.to_string())
    }
}

/// What to authorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Expected payer; must match the signing key.
    pub payer: Address,
    /// Payee. For [`AuthorizationKind::Receive`] this is the ledger contract.
    pub recipient: Address,
    /// Token contract.
    pub token: Address,
    /// Amount in the token's smallest unit.
    pub amount: U256,
    /// Chain the token is deployed on.
    pub chain_id: ChainId,
    /// Explicit `(valid_after, valid_before)`; defaults to the next hour.
    pub window: Option<(UnixTimestamp, UnixTimestamp)>,
    /// Primary type to sign.
    pub kind: AuthorizationKind,
    /// EIP-712 domain override for tokens outside the known-network table.
    pub domain: Option<TokenDomain>,
}

impl AuthorizationRequest {
    /// A receive-style request with the default window and domain lookup.
    #[must_use]
    pub const fn new(
        payer: Address,
        recipient: Address,
        token: Address,
        amount: U256,
        chain_id: ChainId,
    ) -> Self {
        Self {
            payer,
            recipient,
            token,
            amount,
            chain_id,
            window: None,
            kind: AuthorizationKind::Receive,
            domain: None,
        }
    }

    /// Sets an explicit validity window.
    #[must_use]
    pub const fn with_window(mut self, valid_after: UnixTimestamp, valid_before: UnixTimestamp) -> Self {
        self.window = Some((valid_after, valid_before));
        self
    }

    /// Sets the primary type.
    #[must_use]
    pub const fn with_kind(mut self, kind: AuthorizationKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the EIP-712 domain explicitly.
    #[must_use]
    pub fn with_domain(mut self, domain: TokenDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    fn resolve_domain(&self) -> Result<TokenDomain, BuildError> {
        match &self.domain {
            Some(domain) => Ok(domain.clone()),
            None => TokenDomain::known(self.chain_id, self.token).ok_or(BuildError::UnknownToken {
                chain_id: self.chain_id,
                token: self.token,
            }),
        }
    }

    fn resolve_window(&self) -> Result<(UnixTimestamp, UnixTimestamp), BuildError> {
        let (valid_after, valid_before) = self.window.unwrap_or_else(|| {
            let now = UnixTimestamp::now();
            (now, now + DEFAULT_VALIDITY_SECS)
        });
        if valid_before <= valid_after {
            return Err(BuildError::EmptyWindow {
                valid_after,
                valid_before,
            });
        }
        Ok((valid_after, valid_before))
    }
}

/// Builds and signs payment authorizations.
#[derive(Debug, Clone)]
pub struct AuthorizationBuilder<S> {
    signer: Option<S>,
}

impl<S: SignerLike> AuthorizationBuilder<S> {
    /// A builder signing with `signer`.
    pub const fn new(signer: S) -> Self {
        Self {
            signer: Some(signer),
        }
    }

    /// A builder with no key; every build fails with [`BuildError::NoSigner`].
    #[must_use]
    pub const fn without_signer() -> Self {
        Self { signer: None }
    }

    /// Address of the signing key, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer.as_ref().map(SignerLike::address)
    }

    /// Builds the message for `request` and asks the payer to sign it.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when no signer is available, the request is
    /// inconsistent, or the signer fails.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err, fields(
        payer = %request.payer,
        amount = %request.amount,
        chain_id = request.chain_id
    )))]
    pub async fn build(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<SignOutcome<AuthorizationBundle>, BuildError> {
        let signer = self.signer.as_ref().ok_or(BuildError::NoSigner)?;
        if signer.address() != request.payer {
            return Err(BuildError::PayerMismatch {
                requested: request.payer,
                signer: signer.address(),
            });
        }
        let domain = request.resolve_domain()?;
        let (valid_after, valid_before) = request.resolve_window()?;
        let nonce: [u8; 32] = rng().random();

        let message = PaymentAuthorization {
            from: request.payer,
            to: request.recipient,
            value: request.amount,
            valid_after,
            valid_before,
            nonce: B256::from(nonce),
        };
        let hash = signing_hash(request.kind, &message, &domain.eip712());

        let outcome = signer.sign_hash(&hash).await?.map(|signature| {
            AuthorizationBundle::new(
                message,
                &signature,
                caip2(request.chain_id),
                request.token,
                request.kind,
            )
        });
        #[cfg(feature = "telemetry")]
        if outcome.is_cancelled() {
            tracing::info!("payer declined to sign");
        }
        Ok(outcome)
    }

    /// [`AuthorizationBuilder::build`], returning the base64 transport form.
    ///
    /// # Errors
    ///
    /// Same as [`AuthorizationBuilder::build`], plus [`BuildError::Encode`].
    pub async fn build_encoded(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<SignOutcome<String>, BuildError> {
        match self.build(request).await? {
            SignOutcome::Signed(bundle) => Ok(SignOutcome::Signed(bundle.encode()?)),
            SignOutcome::Cancelled => Ok(SignOutcome::Cancelled),
        }
    }
}

/// A [`PaymentSource`] that signs a new authorization for the same request
/// each time, with a new nonce and window.
#[derive(Debug, Clone)]
pub struct FreshPayments<S> {
    builder: AuthorizationBuilder<S>,
    request: AuthorizationRequest,
}

impl<S: SignerLike> FreshPayments<S> {
    /// Signs `request` with `builder` on every call.
    pub const fn new(builder: AuthorizationBuilder<S>, request: AuthorizationRequest) -> Self {
        Self { builder, request }
    }

    /// The request template.
    pub const fn request(&self) -> &AuthorizationRequest {
        &self.request
    }
}

impl<S: SignerLike> PaymentSource for FreshPayments<S> {
    type Error = BuildError;

    async fn fresh_payment(&self) -> Result<SignOutcome<String>, BuildError> {
        // An explicit window would be stale on the retry.
        let mut request = self.request.clone();
        request.window = None;
        self.builder.build_encoded(&request).await
    }
}
