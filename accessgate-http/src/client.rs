//! A client for a remote quota server.
//!
//! [`SubscriptionClient`] creates and reads subscriptions and makes protected
//! calls over JSON HTTP. Every response is checked against the closed
//! [`Envelope`] schema, and every subscription record against its own
//! invariants, before it is returned; nothing loosely typed leaves this
//! module.

use std::fmt::Display;
use std::time::Duration;

use accessgate::subscription::SubscriptionRecord;
use alloy_primitives::B256;
use http::HeaderMap;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
#[cfg(feature = "telemetry")]
use tracing::{Span, instrument};
use url::Url;

use crate::constants::{PROTECTED_PATH, SUBSCRIPTIONS_PATH};
use crate::error::SubscriptionClientError;
use crate::types::{
    ApiError, CreateSubscriptionRequest, Envelope, ProtectedRequest, ProtectedResponse,
};

/// A client for a quota server.
#[derive(Clone, Debug)]
pub struct SubscriptionClient {
    /// Base URL of the server (e.g. `https://quota.example/`)
    base_url: Url,
    /// Full URL of the subscription collection
    subscriptions_url: Url,
    /// Full URL prefix of protected resources
    protected_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Custom headers sent with each request
    headers: HeaderMap,
    /// Optional request timeout
    timeout: Option<Duration>,
}

impl SubscriptionClient {
    /// Returns the base URL used by this client.
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Returns the subscription collection URL.
    pub const fn subscriptions_url(&self) -> &Url {
        &self.subscriptions_url
    }

    /// Returns the configured timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionClientError::UrlParse`] if endpoint URLs cannot
    /// be derived from `base_url`.
    pub fn try_new(base_url: Url) -> Result<Self, SubscriptionClientError> {
        let subscriptions_url = base_url.join(SUBSCRIPTIONS_PATH).map_err(|e| {
            SubscriptionClientError::UrlParse {
                context: "Failed to construct subscriptions URL",
                source: e,
            }
        })?;
        let protected_url =
            base_url
                .join(PROTECTED_PATH)
                .map_err(|e| SubscriptionClientError::UrlParse {
                    context: "Failed to construct protected URL",
                    source: e,
                })?;
        Ok(Self {
            base_url,
            subscriptions_url,
            protected_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: None,
        })
    }

    /// Attaches custom headers to all future requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends `POST /subscriptions`: verifies the payment and opens a
    /// subscription for it.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionClientError`] on transport failure, an error
    /// envelope, or an invalid response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "accessgate.subscription_client.create", skip_all, err, fields(scope = %request.scope))
    )]
    pub async fn create_subscription(
        &self,
        request: &CreateSubscriptionRequest,
    ) -> Result<SubscriptionRecord, SubscriptionClientError> {
        let context = "POST /subscriptions";
        let builder = self.client.post(self.subscriptions_url.clone()).json(request);
        let record = self.send(builder, context).await?;
        checked(record, context)
    }

    /// Sends `GET /subscriptions/{tx_hash}`.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionClientError`] on transport failure, an error
    /// envelope, or an invalid response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "accessgate.subscription_client.get", skip(self), err)
    )]
    pub async fn subscription(
        &self,
        tx_hash: &B256,
    ) -> Result<SubscriptionRecord, SubscriptionClientError> {
        let context = "GET /subscriptions/{tx_hash}";
        let url = with_segment(&self.subscriptions_url, &tx_hash.to_string(), context)?;
        let record: SubscriptionRecord = self.send(self.client.get(url), context).await?;
        if record.tx_hash != *tx_hash {
            return Err(SubscriptionClientError::InvalidResponse {
                context,
                reason: format!("asked for {tx_hash}, got {}", record.tx_hash),
            });
        }
        checked(record, context)
    }

    /// Sends `POST /protected/{resource}`.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionClientError`] on transport failure, an error
    /// envelope, or an invalid response.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "accessgate.subscription_client.protected", skip(self, request), err)
    )]
    pub async fn protected<T: DeserializeOwned>(
        &self,
        resource: &str,
        request: &ProtectedRequest,
    ) -> Result<ProtectedResponse<T>, SubscriptionClientError> {
        let context = "POST /protected/{resource}";
        let url = with_segment(&self.protected_url, resource, context)?;
        let response: ProtectedResponse<T> =
            self.send(self.client.post(url).json(request), context).await?;
        let subscription = checked(response.subscription, context)?;
        Ok(ProtectedResponse {
            subscription,
            ..response
        })
    }

    /// Applies headers and timeout, sends, and unwraps the envelope.
    async fn send<R: DeserializeOwned>(
        &self,
        mut req: RequestBuilder,
        context: &'static str,
    ) -> Result<R, SubscriptionClientError> {
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let result = async {
            let http_response = req
                .send()
                .await
                .map_err(|e| SubscriptionClientError::Http { context, source: e })?;
            let status = http_response.status();
            let body = http_response
                .text()
                .await
                .map_err(|e| SubscriptionClientError::ResponseBodyRead { context, source: e })?;

            let envelope: Envelope<R> = match serde_json::from_str(&body) {
                Ok(envelope) => envelope,
                Err(source) if status.is_success() => {
                    return Err(SubscriptionClientError::JsonDeserialization { context, source });
                }
                Err(_) => {
                    return Err(SubscriptionClientError::HttpStatus {
                        context,
                        status,
                        body,
                    });
                }
            };
            match envelope
                .into_result()
                .map_err(|e| SubscriptionClientError::malformed(context, e))?
            {
                Ok(data) if status.is_success() => Ok(data),
                Ok(_) => Err(SubscriptionClientError::InvalidResponse {
                    context,
                    reason: format!("success envelope with status {status}"),
                }),
                Err(ApiError { code, message }) => Err(SubscriptionClientError::Api {
                    context,
                    status,
                    code,
                    message,
                }),
            }
        }
        .await;

        record_result_on_span(&result);

        result
    }
}

/// Converts a string URL into a `SubscriptionClient`, normalizing it to a
/// single trailing slash.
impl TryFrom<&str> for SubscriptionClient {
    type Error = SubscriptionClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| SubscriptionClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

impl TryFrom<String> for SubscriptionClient {
    type Error = SubscriptionClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

fn with_segment(
    base: &Url,
    segment: &str,
    context: &'static str,
) -> Result<Url, SubscriptionClientError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| SubscriptionClientError::UrlParse {
            context,
            source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
        })?
        .push(segment);
    Ok(url)
}

fn checked(
    record: SubscriptionRecord,
    context: &'static str,
) -> Result<SubscriptionRecord, SubscriptionClientError> {
    if record.is_consistent() {
        Ok(record)
    } else {
        Err(SubscriptionClientError::InvalidResponse {
            context,
            reason: format!("inconsistent subscription record {record:?}"),
        })
    }
}

/// Records the outcome of a request on the current span.
#[cfg(feature = "telemetry")]
fn record_result_on_span<R, E: Display>(result: &Result<R, E>) {
    let span = Span::current();
    match result {
        Ok(_) => {
            span.record("status", "ok");
        }
        Err(err) => {
            span.record("status", "error");
            tracing::event!(tracing::Level::WARN, error = %err, "Request to quota server failed");
        }
    }
}

/// Noop if telemetry feature is off.
#[cfg(not(feature = "telemetry"))]
const fn record_result_on_span<R, E: Display>(_result: &Result<R, E>) {}
