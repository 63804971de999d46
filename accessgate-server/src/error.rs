//! Error types of the quota server.

use accessgate::error::{LedgerError, SubscriptionError};
use accessgate::encoding::TransportDecodeError;
use accessgate::subscription::DataScope;
use accessgate_evm::signature::SignatureError;
use accessgate_http::constants::{
    INTERNAL_ERROR, INVALID_REQUEST, PAYMENT_VERIFICATION_FAILED, SCOPE_MISMATCH,
};
use accessgate_http::types::Envelope;
use alloy_primitives::{Address, B256, U256};
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Why a payment header was not accepted.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The header is not a base64 JSON authorization bundle.
    #[error("Malformed payment header: {0}")]
    Decode(#[from] TransportDecodeError),
    /// The signature bytes are malformed.
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// Only receive-style authorizations can be pulled by the ledger.
    #[error("Payment must be a receiveWithAuthorization")]
    UnsupportedKind,
    /// The bundle names another chain.
    #[error("Payment is for network {got}, expected {expected}")]
    WrongNetwork {
        /// Network the server accepts.
        expected: String,
        /// Network in the bundle.
        got: String,
    },
    /// The bundle names another token.
    #[error("Payment is in token {got}, expected {expected}")]
    WrongToken {
        /// Token the server accepts.
        expected: Address,
        /// Token in the bundle.
        got: Address,
    },
    /// The authorization pays someone other than the ledger.
    #[error("Payment is to {got}, expected {expected}")]
    WrongPayee {
        /// The ledger address.
        expected: Address,
        /// Payee in the authorization.
        got: Address,
    },
    /// The authorization does not cover the expected amount.
    #[error("Payment of {sent} does not cover {required}")]
    Underpaid {
        /// Authorized value.
        sent: U256,
        /// Expected value.
        required: U256,
    },
    /// The ledger refused to redeem the authorization.
    #[error("Ledger rejected payment: {0}")]
    Rejected(#[source] LedgerError),
}

/// Errors returned by the quota server's handlers.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Payment verification failed.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The subscription cannot serve the call.
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// The subscription was bought for another agent or dataroom.
    #[error("Subscription {tx_hash} covers {granted}, not {requested}")]
    ScopeMismatch {
        /// The subscription.
        tx_hash: B256,
        /// Scope it was bought for.
        granted: DataScope,
        /// Scope of the request.
        requested: DataScope,
    },

    /// Malformed body, path, or parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No such protected resource.
    #[error("Unknown resource `{0}`")]
    UnknownResource(String),

    /// The ledger failed for a reason unrelated to the payment.
    #[error("Ledger error: {0}")]
    Ledger(#[source] LedgerError),
}

impl From<LedgerError> for ServerError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::PaymentBelowMinimum { .. } | LedgerError::Redemption(_) => {
                Self::Payment(PaymentError::Rejected(err))
            }
            other => Self::Ledger(other),
        }
    }
}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ServerError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl ServerError {
    /// HTTP status of the error response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Payment(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Subscription(err) => match err {
                SubscriptionError::NotFound => StatusCode::NOT_FOUND,
                SubscriptionError::AlreadyExists => StatusCode::CONFLICT,
                SubscriptionError::Exhausted => StatusCode::TOO_MANY_REQUESTS,
                SubscriptionError::Expired => StatusCode::BAD_REQUEST,
            },
            Self::ScopeMismatch { .. } => StatusCode::FORBIDDEN,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::UnknownResource(_) => StatusCode::NOT_FOUND,
            Self::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code in the error envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Payment(_) => PAYMENT_VERIFICATION_FAILED,
            Self::Subscription(err) => err.code(),
            Self::ScopeMismatch { .. } => SCOPE_MISMATCH,
            Self::InvalidRequest(_) | Self::UnknownResource(_) => INVALID_REQUEST,
            Self::Ledger(_) => INTERNAL_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, code = self.code(), "request rejected");
        }
        let body = Envelope::<()>::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}
