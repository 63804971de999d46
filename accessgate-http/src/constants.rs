//! Route paths and error codes shared by the quota server and its clients.

/// Subscription collection: `POST` creates, `GET {SUBSCRIPTIONS_PATH}/{tx_hash}` reads.
pub const SUBSCRIPTIONS_PATH: &str = "subscriptions";

/// Prefix of protected resources: `POST {PROTECTED_PATH}/{resource}`.
pub const PROTECTED_PATH: &str = "protected";

/// Liveness probe.
pub const HEALTH_PATH: &str = "health";

/// HTTP 402 Payment Required status code.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// The payment header failed to decode or verify, or did not cover the
/// expected amount. Always sent with HTTP 402.
pub const PAYMENT_VERIFICATION_FAILED: &str = "payment_verification_failed";

/// The request body or path was malformed.
pub const INVALID_REQUEST: &str = "invalid_request";

/// The subscription does not cover the requested agent or dataroom.
pub const SCOPE_MISMATCH: &str = "scope_mismatch";

/// The server failed.
pub const INTERNAL_ERROR: &str = "internal_error";
