//! Axum route handlers of the quota server.
//!
//! Every response body is an [`Envelope`]. Subscription reads and protected
//! calls are keyed by the payment transaction hash; protected calls may
//! instead carry a payment header, which opens a new subscription first.

use accessgate::config::SubscriptionPolicy;
use accessgate::subscription::{DataScope, SubscriptionRecord};
use accessgate::timestamp::UnixTimestamp;
use accessgate_http::constants::{HEALTH_PATH, PROTECTED_PATH, SUBSCRIPTIONS_PATH};
use accessgate_http::types::{
    CreateSubscriptionRequest, Envelope, ProofBody, ProtectedRequest, ProtectedResponse,
};
use alloy_primitives::B256;
use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::error::ServerError;
use crate::state::SharedState;

/// `POST /subscriptions` - Redeems a payment and opens a subscription.
///
/// # Errors
///
/// 402 when the payment fails verification, 409 when it was already used,
/// 400 on a malformed body or a zero quota or lifetime.
pub async fn post_subscription(
    State(state): State<SharedState>,
    body: Result<Json<CreateSubscriptionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<SubscriptionRecord>>), ServerError> {
    let Json(request) = body?;
    let defaults = state.policy();
    let policy = SubscriptionPolicy {
        query_limit: request.query_limit.unwrap_or(defaults.query_limit),
        expiration_days: request.expiration_days.unwrap_or(defaults.expiration_days),
    };
    if !policy.is_usable() {
        return Err(ServerError::InvalidRequest(
            "query_limit and expiration_days must be positive".to_owned(),
        ));
    }
    let record = state
        .accept_payment(
            &request.payment_header,
            request.scope,
            request.expected_amount,
            policy,
            UnixTimestamp::now(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(Envelope::ok(record))))
}

/// `GET /subscriptions/{tx_hash}` - Reads a subscription.
///
/// # Errors
///
/// 404 for an unknown hash, 400 for a malformed one.
pub async fn get_subscription(
    State(state): State<SharedState>,
    tx_hash: Result<Path<B256>, PathRejection>,
) -> Result<Json<Envelope<SubscriptionRecord>>, ServerError> {
    let Path(tx_hash) = tx_hash?;
    let record = state.store().get(&tx_hash, UnixTimestamp::now())?;
    Ok(Json(Envelope::ok(record)))
}

/// `POST /protected/{resource}` - Serves one call against a subscription.
///
/// The call is charged only if it is served; the returned record reflects
/// the charge.
///
/// # Errors
///
/// 404 for an unknown resource or subscription, 403 when the subscription
/// covers another scope, 400/429 when it is expired or exhausted, and the
/// [`post_subscription`] errors when paying inline.
pub async fn post_protected(
    State(state): State<SharedState>,
    resource: Result<Path<String>, PathRejection>,
    body: Result<Json<ProtectedRequest>, JsonRejection>,
) -> Result<Json<Envelope<ProtectedResponse<Value>>>, ServerError> {
    let Path(resource) = resource?;
    if !state.serves(&resource) {
        return Err(ServerError::UnknownResource(resource));
    }
    let Json(request) = body?;

    let tx_hash = match request.proof {
        ProofBody::TxHash(tx_hash) => tx_hash,
        ProofBody::PaymentHeader(header) => {
            state
                .accept_payment(
                    &header,
                    request.scope.clone(),
                    state.price(),
                    state.policy(),
                    UnixTimestamp::now(),
                )
                .await?
                .tx_hash
        }
    };

    let (_, granted) = state.store().scope_of(&tx_hash)?;
    if granted != request.scope {
        return Err(ServerError::ScopeMismatch {
            tx_hash,
            granted,
            requested: request.scope,
        });
    }

    let reservation = state.store().reserve(&tx_hash, UnixTimestamp::now())?;
    let result = serve(&resource, &request.scope, request.params);
    let subscription = reservation.commit(UnixTimestamp::now())?;
    tracing::debug!(
        %tx_hash,
        %resource,
        remaining = subscription.queries_remaining,
        "protected call served"
    );
    Ok(Json(Envelope::ok(ProtectedResponse {
        subscription,
        result,
    })))
}

fn serve(resource: &str, scope: &DataScope, params: Value) -> Value {
    json!({
        "resource": resource,
        "scope": scope.to_string(),
        "params": params,
    })
}

/// `GET /health` - Liveness and subscription count.
pub async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "subscriptions": state.store().len(),
    }))
}

/// Creates an Axum [`axum::Router`] with all quota server endpoints.
///
/// Endpoints:
/// - `POST /subscriptions` - redeem a payment and open a subscription
/// - `GET /subscriptions/{tx_hash}` - read a subscription
/// - `POST /protected/{resource}` - serve a call against a subscription
/// - `GET /health` - liveness
pub fn router(state: SharedState) -> axum::Router {
    axum::Router::new()
        .route(
            &format!("/{SUBSCRIPTIONS_PATH}"),
            axum::routing::post(post_subscription),
        )
        .route(
            &format!("/{SUBSCRIPTIONS_PATH}/{{tx_hash}}"),
            axum::routing::get(get_subscription),
        )
        .route(
            &format!("/{PROTECTED_PATH}/{{resource}}"),
            axum::routing::post(post_protected),
        )
        .route(&format!("/{HEALTH_PATH}"), axum::routing::get(health))
        .with_state(state)
}
