//! Base64 encoding and decoding utilities.
//!
//! Signed authorization bundles travel as base64-encoded JSON (the
//! `payment_header` of the subscription API). [`Base64Bytes`] wraps that
//! transport form.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;

/// A wrapper for base64-encoded byte data.
///
/// This type holds bytes that represent base64-encoded data and provides
/// methods for encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64Bytes(pub Vec<u8>);

impl Base64Bytes {
    /// Decodes the base64 string bytes to raw binary data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid base64.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        b64.decode(&self.0)
    }

    /// Encodes raw binary data into base64 string bytes.
    pub fn encode<T: AsRef<[u8]>>(input: T) -> Self {
        let encoded = b64.encode(input.as_ref());
        Self(encoded.into_bytes())
    }
}

impl From<&str> for Base64Bytes {
    fn from(value: &str) -> Self {
        Self(value.trim().as_bytes().to_vec())
    }
}

impl Display for Base64Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Errors from decoding a base64 JSON transport value.
#[derive(Debug, thiserror::Error)]
pub enum TransportDecodeError {
    /// The value is not valid base64.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    /// The decoded bytes are not the expected JSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializes `value` as JSON and wraps it in base64.
///
/// # Errors
///
/// Returns an error if `value` cannot be serialized.
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64Bytes::encode(json).to_string())
}

/// Reverses [`encode_json`].
///
/// # Errors
///
/// Returns [`TransportDecodeError`] if the input is not base64 or not the expected JSON.
pub fn decode_json<T: DeserializeOwned>(encoded: &str) -> Result<T, TransportDecodeError> {
    let bytes = Base64Bytes::from(encoded).decode()?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_garbage() {
        let err = decode_json::<serde_json::Value>("not base64!").unwrap_err();
        assert!(matches!(err, TransportDecodeError::Base64(_)));

        let not_json = Base64Bytes::encode(b"plain text").to_string();
        let err = decode_json::<serde_json::Value>(&not_json).unwrap_err();
        assert!(matches!(err, TransportDecodeError::Json(_)));
    }

    #[test]
    fn decode_tolerates_surrounding_whitespace() {
        let encoded = encode_json(&serde_json::json!({"a": 1})).unwrap();
        let padded = format!("  {encoded}\n");
        let value: serde_json::Value = decode_json(&padded).unwrap();
        assert_eq!(value["a"], 1);
    }
}
