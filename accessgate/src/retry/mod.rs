//! Client-side retry of quota-bound calls.
//!
//! [`RetryCoordinator`] drives the [`machine`] table: it calls a protected
//! endpoint with the selected subscription (or a fresh payment when none is
//! selected), and when the server reports the subscription expired,
//! exhausted, or unknown on the first attempt it clears the selection, waits
//! a fixed backoff, solicits one new signature, and retries exactly once.
//!
//! The coordinator is single-flight: a call made while another is in
//! progress fails immediately with [`RetryError::Busy`].

pub mod machine;

use std::future::Future;

use alloy_primitives::B256;
use tokio::sync::Mutex;
#[cfg(feature = "telemetry")]
use tracing::instrument;

pub use machine::{
    AttemptMode, FailureClass, InvalidTransition, RetryEvent, RetryMachine, RetryState,
    transition,
};

use crate::authorization::SignOutcome;
use crate::config::RetryPolicy;

/// Proof of access presented with a protected call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessProof {
    /// Transaction hash of an existing subscription.
    Subscription(B256),
    /// Transport-encoded signed payment authorization.
    Payment(String),
}

impl AccessProof {
    /// The attempt mode this proof corresponds to.
    #[must_use]
    pub const fn mode(&self) -> AttemptMode {
        match self {
            Self::Subscription(_) => AttemptMode::UsingSubscription,
            Self::Payment(_) => AttemptMode::UsingFreshPayment,
        }
    }
}

/// A served protected call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served<T> {
    /// Response payload.
    pub value: T,
    /// Subscription the server created or used for this call.
    pub subscription: Option<B256>,
}

/// Errors that can be sorted into a [`FailureClass`].
pub trait ClassifyFailure {
    /// How the coordinator should treat this failure.
    fn failure_class(&self) -> FailureClass;
}

/// A protected endpoint the coordinator can call.
pub trait ProtectedCall: Send + Sync {
    /// Payload of a served call.
    type Output: Send;
    /// Failure of a call.
    type Error: ClassifyFailure + std::error::Error + Send + 'static;

    /// Calls the endpoint once with `proof`.
    fn call(
        &self,
        proof: &AccessProof,
    ) -> impl Future<Output = Result<Served<Self::Output>, Self::Error>> + Send;
}

/// Source of freshly signed payment authorizations.
///
/// Signing is user-mediated: [`SignOutcome::Cancelled`] means the payer
/// declined. The coordinator never asks twice for the same call.
pub trait PaymentSource: Send + Sync {
    /// Failure to produce an authorization.
    type Error: std::error::Error + Send + 'static;

    /// Builds and signs a new authorization, returned transport-encoded.
    fn fresh_payment(&self)
    -> impl Future<Output = Result<SignOutcome<String>, Self::Error>> + Send;
}

impl<T: PaymentSource> PaymentSource for std::sync::Arc<T> {
    type Error = T::Error;

    async fn fresh_payment(&self) -> Result<SignOutcome<String>, Self::Error> {
        (**self).fresh_payment().await
    }
}

/// Result of a coordinated call that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// The call was served.
    Succeeded {
        /// Response payload.
        value: T,
        /// Protected calls made, 1 or 2.
        attempts: u8,
    },
    /// The payer declined to sign.
    Cancelled,
}

impl<T> RetryOutcome<T> {
    /// The payload, if the call was served.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Succeeded { value, .. } => Some(value),
            Self::Cancelled => None,
        }
    }
}

/// Terminal failures of a coordinated call.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<C, P> {
    /// Another call is in flight.
    #[error("A protected call is already in flight")]
    Busy,
    /// The protected call failed.
    #[error("Protected call failed after {attempts} attempt(s): {source}")]
    Call {
        /// The last failure.
        source: C,
        /// Protected calls made.
        attempts: u8,
    },
    /// No authorization could be produced.
    #[error("Failed to obtain a payment authorization: {0}")]
    Payment(#[source] P),
    /// The driver fed the table an event it rejects.
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// Single-flight coordinator for quota-bound protected calls.
#[derive(Debug)]
pub struct RetryCoordinator<P> {
    payments: P,
    policy: RetryPolicy,
    selection: Mutex<Option<B256>>,
}

impl<P: PaymentSource> RetryCoordinator<P> {
    /// A coordinator with no subscription selected.
    pub fn new(payments: P, policy: RetryPolicy) -> Self {
        Self {
            payments,
            policy,
            selection: Mutex::new(None),
        }
    }

    /// A coordinator starting with `tx_hash` selected.
    #[must_use]
    pub fn with_selection(self, tx_hash: B256) -> Self {
        Self {
            selection: Mutex::new(Some(tx_hash)),
            ..self
        }
    }

    /// The payment source re-signing is delegated to.
    pub const fn payments(&self) -> &P {
        &self.payments
    }

    /// Currently selected subscription. Waits for an in-flight call.
    pub async fn selection(&self) -> Option<B256> {
        *self.selection.lock().await
    }

    /// Replaces the selection. Waits for an in-flight call.
    pub async fn select(&self, tx_hash: Option<B256>) {
        *self.selection.lock().await = tx_hash;
    }

    /// Whether a call is in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.selection.try_lock().is_err()
    }

    /// Runs `call` to a terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`RetryError::Busy`] if another call is in flight,
    /// [`RetryError::Call`] with the last failure once no retry is allowed,
    /// or [`RetryError::Payment`] if signing failed.
    #[cfg_attr(feature = "telemetry", instrument(skip_all, err))]
    pub async fn execute<C: ProtectedCall>(
        &self,
        call: &C,
    ) -> Result<RetryOutcome<C::Output>, RetryError<C::Error, P::Error>> {
        let mut selection = self.selection.try_lock().map_err(|_| RetryError::Busy)?;
        let mut machine = RetryMachine::new();

        let mut proof = if let Some(tx_hash) = *selection {
            machine.apply(RetryEvent::StartWithSubscription)?;
            AccessProof::Subscription(tx_hash)
        } else {
            match self.sign::<C::Error>(&mut machine, RetryEvent::StartWithPayment).await? {
                Some(proof) => proof,
                None => return Ok(RetryOutcome::Cancelled),
            }
        };

        loop {
            match call.call(&proof).await {
                Ok(served) => {
                    machine.apply(RetryEvent::Served)?;
                    if let Some(tx_hash) = served.subscription {
                        *selection = Some(tx_hash);
                    }
                    return Ok(RetryOutcome::Succeeded {
                        value: served.value,
                        attempts: machine.attempts(),
                    });
                }
                Err(err) => {
                    let class = err.failure_class();
                    if machine.apply(RetryEvent::Failed(class))? != RetryState::RetryPending {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(?class, attempts = machine.attempts(), "protected call failed");
                        return Err(RetryError::Call {
                            source: err,
                            attempts: machine.attempts(),
                        });
                    }
                    #[cfg(feature = "telemetry")]
                    tracing::info!(
                        ?class,
                        backoff_ms = self.policy.backoff_ms,
                        "subscription invalid, retrying with a fresh payment"
                    );
                    *selection = None;
                    tokio::time::sleep(self.policy.backoff()).await;
                    proof = match self.sign::<C::Error>(&mut machine, RetryEvent::Resigned).await? {
                        Some(proof) => proof,
                        None => return Ok(RetryOutcome::Cancelled),
                    };
                }
            }
        }
    }

    async fn sign<C>(
        &self,
        machine: &mut RetryMachine,
        on_signed: RetryEvent,
    ) -> Result<Option<AccessProof>, RetryError<C, P::Error>> {
        match self.payments.fresh_payment().await {
            Ok(SignOutcome::Signed(header)) => {
                machine.apply(on_signed)?;
                Ok(Some(AccessProof::Payment(header)))
            }
            Ok(SignOutcome::Cancelled) => {
                #[cfg(feature = "telemetry")]
                tracing::info!("payer declined to sign");
                machine.apply(RetryEvent::SigningCancelled)?;
                Ok(None)
            }
            Err(err) => {
                machine.apply(RetryEvent::SigningFailed)?;
                Err(RetryError::Payment(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;
    use crate::error::SubscriptionError;

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("call failed: {0:?}")]
    struct CallFailure(FailureClass);

    impl ClassifyFailure for CallFailure {
        fn failure_class(&self) -> FailureClass {
            self.0
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("no signer")]
    struct NoSigner;

    /// Pops one scripted outcome per signing request.
    #[derive(Debug, Default)]
    struct ScriptedPayments {
        outcomes: std::sync::Mutex<VecDeque<Result<SignOutcome<String>, ()>>>,
        prompts: AtomicUsize,
    }

    impl ScriptedPayments {
        fn new(outcomes: impl IntoIterator<Item = Result<SignOutcome<String>, ()>>) -> Self {
            Self {
                outcomes: std::sync::Mutex::new(outcomes.into_iter().collect()),
                prompts: AtomicUsize::new(0),
            }
        }
    }

    impl PaymentSource for ScriptedPayments {
        type Error = NoSigner;

        async fn fresh_payment(&self) -> Result<SignOutcome<String>, NoSigner> {
            let n = self.prompts.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(SignOutcome::Signed(format!("payment-{n}"))))
                .map_err(|()| NoSigner)
        }
    }

    /// Pops one scripted response per call and records the proofs it saw.
    #[derive(Debug, Default)]
    struct ScriptedEndpoint {
        responses: std::sync::Mutex<VecDeque<Result<Served<&'static str>, CallFailure>>>,
        seen: std::sync::Mutex<Vec<AccessProof>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedEndpoint {
        fn new(
            responses: impl IntoIterator<Item = Result<Served<&'static str>, CallFailure>>,
        ) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into_iter().collect()),
                ..Self::default()
            }
        }

        fn seen(&self) -> Vec<AccessProof> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl ProtectedCall for ScriptedEndpoint {
        type Output = &'static str;
        type Error = CallFailure;

        async fn call(&self, proof: &AccessProof) -> Result<Served<&'static str>, CallFailure> {
            self.seen.lock().unwrap().push(proof.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(CallFailure(FailureClass::Other)))
        }
    }

    fn served(value: &'static str, tx: Option<u8>) -> Result<Served<&'static str>, CallFailure> {
        Ok(Served {
            value,
            subscription: tx.map(B256::repeat_byte),
        })
    }

    fn failed(class: FailureClass) -> Result<Served<&'static str>, CallFailure> {
        Err(CallFailure(class))
    }

    const EXPIRED: FailureClass = FailureClass::SubscriptionInvalid(SubscriptionError::Expired);
    const EXHAUSTED: FailureClass = FailureClass::SubscriptionInvalid(SubscriptionError::Exhausted);

    fn coordinator(payments: ScriptedPayments) -> RetryCoordinator<ScriptedPayments> {
        RetryCoordinator::new(payments, RetryPolicy::with_backoff(Duration::from_millis(500)))
            .with_selection(B256::repeat_byte(1))
    }

    #[tokio::test]
    async fn valid_subscription_needs_no_signature() {
        let coordinator = coordinator(ScriptedPayments::default());
        let endpoint = ScriptedEndpoint::new([served("ok", Some(1))]);

        let outcome = coordinator.execute(&endpoint).await.unwrap();

        assert_eq!(outcome, RetryOutcome::Succeeded { value: "ok", attempts: 1 });
        assert_eq!(coordinator.payments.prompts.load(Ordering::SeqCst), 0);
        assert_eq!(endpoint.seen(), vec![AccessProof::Subscription(B256::repeat_byte(1))]);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_subscription_retries_once_with_fresh_payment() {
        let coordinator = coordinator(ScriptedPayments::default());
        let endpoint = ScriptedEndpoint::new([failed(EXPIRED), served("ok", Some(2))]);

        let started = tokio::time::Instant::now();
        let outcome = coordinator.execute(&endpoint).await.unwrap();

        assert_eq!(outcome, RetryOutcome::Succeeded { value: "ok", attempts: 2 });
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(
            endpoint.seen(),
            vec![
                AccessProof::Subscription(B256::repeat_byte(1)),
                AccessProof::Payment("payment-0".into()),
            ]
        );
        assert_eq!(coordinator.selection().await, Some(B256::repeat_byte(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn second_failure_is_terminal() {
        let coordinator = coordinator(ScriptedPayments::default());
        let endpoint = ScriptedEndpoint::new([failed(EXHAUSTED), failed(EXPIRED), served("late", None)]);

        let err = coordinator.execute(&endpoint).await.unwrap_err();

        assert!(matches!(
            err,
            RetryError::Call { source: CallFailure(EXPIRED), attempts: 2 }
        ));
        assert_eq!(endpoint.seen().len(), 2);
        assert_eq!(coordinator.payments.prompts.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.selection().await, None);
    }

    #[tokio::test]
    async fn non_subscription_failures_propagate_immediately() {
        for class in [
            FailureClass::Network,
            FailureClass::Timeout,
            FailureClass::PaymentVerification,
            FailureClass::Validation,
            FailureClass::Backend,
        ] {
            let coordinator = coordinator(ScriptedPayments::default());
            let endpoint = ScriptedEndpoint::new([failed(class), served("never", None)]);

            let err = coordinator.execute(&endpoint).await.unwrap_err();

            assert!(matches!(err, RetryError::Call { attempts: 1, .. }), "{class:?}");
            assert_eq!(coordinator.payments.prompts.load(Ordering::SeqCst), 0);
            assert_eq!(coordinator.selection().await, Some(B256::repeat_byte(1)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn declined_signature_is_cancelled_not_failed() {
        let coordinator = coordinator(ScriptedPayments::new([Ok(SignOutcome::Cancelled)]));
        let endpoint = ScriptedEndpoint::new([failed(EXPIRED)]);

        let outcome = coordinator.execute(&endpoint).await.unwrap();

        assert_eq!(outcome, RetryOutcome::Cancelled);
        assert_eq!(endpoint.seen().len(), 1);
    }

    #[tokio::test]
    async fn signing_failure_surfaces() {
        let coordinator = RetryCoordinator::new(
            ScriptedPayments::new([Err(())]),
            RetryPolicy::default(),
        );
        let endpoint = ScriptedEndpoint::new([served("never", None)]);

        let err = coordinator.execute(&endpoint).await.unwrap_err();

        assert!(matches!(err, RetryError::Payment(NoSigner)));
        assert!(endpoint.seen().is_empty());
    }

    #[tokio::test]
    async fn no_selection_pays_first_and_adopts_new_subscription() {
        let coordinator = RetryCoordinator::new(ScriptedPayments::default(), RetryPolicy::default());
        let endpoint = ScriptedEndpoint::new([served("ok", Some(7))]);

        let outcome = coordinator.execute(&endpoint).await.unwrap();

        assert_eq!(outcome.into_value(), Some("ok"));
        assert_eq!(endpoint.seen(), vec![AccessProof::Payment("payment-0".into())]);
        assert_eq!(coordinator.selection().await, Some(B256::repeat_byte(7)));
    }

    #[tokio::test]
    async fn concurrent_call_is_rejected_as_busy() {
        let coordinator = coordinator(ScriptedPayments::default());
        let gate = Arc::new(Notify::new());
        let slow = ScriptedEndpoint {
            gate: Some(Arc::clone(&gate)),
            ..ScriptedEndpoint::new([served("slow", None)])
        };
        let fast = ScriptedEndpoint::new([served("fast", None)]);

        let (first, second) = tokio::join!(coordinator.execute(&slow), async {
            let result = coordinator.execute(&fast).await;
            gate.notify_one();
            result
        });

        assert_eq!(first.unwrap().into_value(), Some("slow"));
        assert!(matches!(second, Err(RetryError::Busy)));
        assert!(fast.seen().is_empty());
        assert!(!coordinator.is_busy());
    }
}
