//! Wire types of the quota server.
//!
//! Every response is wrapped in an [`Envelope`]. The envelope schema is
//! closed: unknown fields are rejected, and exactly one of `data` and
//! `error` must be present, matching `success`.

use accessgate::retry::AccessProof;
use accessgate::subscription::{DataScope, SubscriptionRecord};
use alloy_primitives::{B256, U256};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// Body of `POST /subscriptions`.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSubscriptionRequest {
    /// Transport-encoded signed payment authorization.
    pub payment_header: String,
    /// `agent_id` or `dataroom_id`.
    #[serde(flatten)]
    pub scope: DataScope,
    /// Amount the payment must cover, in token units.
    #[serde_as(as = "DisplayFromStr")]
    pub expected_amount: U256,
    /// Calls to buy; server default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_limit: Option<u32>,
    /// Lifetime in days; server default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_days: Option<u32>,
}

/// How a protected request proves access: `{"tx_hash": ...}` or
/// `{"payment_header": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofBody {
    /// Reuse an existing subscription.
    TxHash(B256),
    /// Pay and open a new subscription.
    PaymentHeader(String),
}

impl From<&AccessProof> for ProofBody {
    fn from(proof: &AccessProof) -> Self {
        match proof {
            AccessProof::Subscription(tx_hash) => Self::TxHash(*tx_hash),
            AccessProof::Payment(header) => Self::PaymentHeader(header.clone()),
        }
    }
}

/// Body of `POST /protected/{resource}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedRequest {
    /// Subscription or payment.
    #[serde(flatten)]
    pub proof: ProofBody,
    /// Agent or dataroom the call targets.
    #[serde(flatten)]
    pub scope: DataScope,
    /// Resource-specific parameters.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

/// `data` of a served protected call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedResponse<T> {
    /// The subscription after this call was charged to it.
    pub subscription: SubscriptionRecord,
    /// Resource payload.
    pub result: T,
}

/// Machine-readable failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiError {
    /// Stable error code, e.g. `subscription_expired`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

/// Response wrapper: `{success, data?, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Envelope<T> {
    /// Whether the request was served.
    pub success: bool,
    /// Payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// An envelope whose `success` flag disagrees with its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Malformed response envelope: {0}")]
pub struct MalformedEnvelope(&'static str);

impl<T> Envelope<T> {
    /// A success envelope.
    pub const fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failure envelope.
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// Splits the envelope into its payload or its error.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedEnvelope`] unless exactly the field named by
    /// `success` is present.
    pub fn into_result(self) -> Result<Result<T, ApiError>, MalformedEnvelope> {
        match (self.success, self.data, self.error) {
            (true, Some(data), None) => Ok(Ok(data)),
            (false, None, Some(error)) => Ok(Err(error)),
            (true, None, _) => Err(MalformedEnvelope("success without data")),
            (false, _, None) => Err(MalformedEnvelope("failure without error")),
            (true, Some(_), Some(_)) => Err(MalformedEnvelope("success with error")),
            (false, Some(_), Some(_)) => Err(MalformedEnvelope("failure with data")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_request_wire_shape() {
        let request = CreateSubscriptionRequest {
            payment_header: "eyJ9".into(),
            scope: DataScope::Agent("agent-7".into()),
            expected_amount: U256::from(10_000u32),
            query_limit: Some(50),
            expiration_days: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "payment_header": "eyJ9",
                "agent_id": "agent-7",
                "expected_amount": "10000",
                "query_limit": 50,
            })
        );
    }

    #[test]
    fn protected_request_accepts_either_proof() {
        let tx_hash = B256::repeat_byte(0x11);
        let by_hash: ProtectedRequest = serde_json::from_value(json!({
            "tx_hash": tx_hash,
            "dataroom_id": "room-1",
        }))
        .unwrap();
        assert_eq!(by_hash.proof, ProofBody::TxHash(tx_hash));
        assert_eq!(by_hash.scope, DataScope::Dataroom("room-1".into()));
        assert!(by_hash.params.is_null());

        let by_payment: ProtectedRequest = serde_json::from_value(json!({
            "payment_header": "abc",
            "agent_id": "a",
            "params": {"q": "select"},
        }))
        .unwrap();
        assert_eq!(by_payment.proof, ProofBody::PaymentHeader("abc".into()));
        assert_eq!(by_payment.params["q"], "select");
    }

    #[test]
    fn envelope_is_closed() {
        let ok: Envelope<u32> = serde_json::from_value(json!({"success": true, "data": 3})).unwrap();
        assert_eq!(ok.into_result(), Ok(Ok(3)));

        let err: Envelope<u32> = serde_json::from_value(json!({
            "success": false,
            "error": {"code": "subscription_expired", "message": "expired"},
        }))
        .unwrap();
        assert_eq!(err.into_result().unwrap().unwrap_err().code, "subscription_expired");

        let inconsistent: Envelope<u32> =
            serde_json::from_value(json!({"success": true})).unwrap();
        assert!(inconsistent.into_result().is_err());

        assert!(
            serde_json::from_value::<Envelope<u32>>(json!({"success": true, "data": 1, "extra": 0}))
                .is_err()
        );
    }
}
