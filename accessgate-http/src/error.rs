//! Errors talking to the quota server.

use accessgate::error::SubscriptionError;
use accessgate::retry::{ClassifyFailure, FailureClass};
use http::StatusCode;

use crate::types::MalformedEnvelope;

/// Errors that can occur while calling the quota server.
#[derive(Debug, thiserror::Error)]
pub enum SubscriptionClientError {
    /// URL parse error.
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        /// Human-readable context.
        context: &'static str,
        /// The underlying parse error.
        #[source]
        source: url::ParseError,
    },
    /// HTTP transport error.
    #[error("HTTP error: {context}: {source}")]
    Http {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// Failed to read response body.
    #[error("Failed to read response body as text: {context}: {source}")]
    ResponseBodyRead {
        /// Human-readable context.
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
    /// The body is not a valid envelope.
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        /// Human-readable context.
        context: &'static str,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The body is an envelope that contradicts itself or its status, or a
    /// subscription record whose flags disagree with its counters.
    #[error("Invalid response: {context}: {reason}")]
    InvalidResponse {
        /// Human-readable context.
        context: &'static str,
        /// What was wrong.
        reason: String,
    },
    /// The server answered with an error envelope.
    #[error("{context} failed with {status}: {code}: {message}")]
    Api {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// Error code from the envelope.
        code: String,
        /// Error message from the envelope.
        message: String,
    },
    /// The server answered with a non-success status and no envelope.
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        /// Human-readable context.
        context: &'static str,
        /// The HTTP status code.
        status: StatusCode,
        /// The response body.
        body: String,
    },
}

impl SubscriptionClientError {
    /// The subscription error the server reported, if any.
    #[must_use]
    pub fn subscription_error(&self) -> Option<SubscriptionError> {
        match self {
            Self::Api { code, .. } => SubscriptionError::from_code(code),
            _ => None,
        }
    }

    pub(crate) fn malformed(context: &'static str, err: MalformedEnvelope) -> Self {
        Self::InvalidResponse {
            context,
            reason: err.to_string(),
        }
    }
}

fn classify_status(status: StatusCode) -> FailureClass {
    if status.as_u16() == crate::constants::HTTP_STATUS_PAYMENT_REQUIRED {
        FailureClass::PaymentVerification
    } else if status.is_client_error() {
        FailureClass::Validation
    } else if status.is_server_error() {
        FailureClass::Backend
    } else {
        FailureClass::Other
    }
}

impl ClassifyFailure for SubscriptionClientError {
    fn failure_class(&self) -> FailureClass {
        match self {
            Self::Api { status, code, .. } => SubscriptionError::from_code(code)
                .map_or_else(|| classify_status(*status), FailureClass::from),
            Self::HttpStatus { status, .. } => classify_status(*status),
            Self::Http { source, .. } if source.is_timeout() => FailureClass::Timeout,
            Self::Http { .. } | Self::ResponseBodyRead { .. } => FailureClass::Network,
            Self::JsonDeserialization { .. } | Self::InvalidResponse { .. } => {
                FailureClass::Backend
            }
            Self::UrlParse { .. } => FailureClass::Other,
        }
    }
}
