//! Protected endpoints as [`ProtectedCall`]s.

use std::marker::PhantomData;

use accessgate::retry::{AccessProof, ProtectedCall, Served};
use accessgate::subscription::DataScope;
use serde::de::DeserializeOwned;

use crate::client::SubscriptionClient;
use crate::error::SubscriptionClientError;
use crate::types::ProtectedRequest;

/// One protected resource on a quota server, scoped to an agent or dataroom.
///
/// Pair it with a [`accessgate::retry::RetryCoordinator`] to get the
/// single automatic retry on an invalid subscription.
#[derive(Debug, Clone)]
pub struct ProtectedEndpoint<T> {
    client: SubscriptionClient,
    resource: String,
    scope: DataScope,
    params: serde_json::Value,
    _output: PhantomData<fn() -> T>,
}

impl<T> ProtectedEndpoint<T> {
    /// `POST /protected/{resource}` for `scope`.
    pub fn new(client: SubscriptionClient, resource: impl Into<String>, scope: DataScope) -> Self {
        Self {
            client,
            resource: resource.into(),
            scope,
            params: serde_json::Value::Null,
            _output: PhantomData,
        }
    }

    /// Sets the resource parameters sent with every call.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }
}

impl<T: DeserializeOwned + Send> ProtectedCall for ProtectedEndpoint<T> {
    type Output = T;
    type Error = SubscriptionClientError;

    async fn call(&self, proof: &AccessProof) -> Result<Served<T>, SubscriptionClientError> {
        let request = ProtectedRequest {
            proof: proof.into(),
            scope: self.scope.clone(),
            params: self.params.clone(),
        };
        let response = self.client.protected::<T>(&self.resource, &request).await?;
        Ok(Served {
            value: response.result,
            subscription: Some(response.subscription.tx_hash),
        })
    }
}
