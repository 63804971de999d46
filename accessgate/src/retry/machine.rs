//! The retry transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SubscriptionError;

/// How a protected call proves access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptMode {
    /// Reusing the selected subscription.
    UsingSubscription,
    /// Presenting a freshly signed payment authorization.
    UsingFreshPayment,
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryState {
    /// No call started.
    Idle,
    /// A protected call is in flight.
    Attempting {
        /// Proof presented.
        mode: AttemptMode,
        /// Whether this is the single automatic retry.
        is_retry: bool,
    },
    /// The first attempt hit an invalid subscription; backing off and
    /// soliciting a fresh authorization.
    RetryPending,
    /// The call was served. Terminal.
    Succeeded,
    /// The call failed for good. Terminal.
    Failed,
    /// The payer declined to sign. Terminal, not an error.
    Cancelled,
}

impl RetryState {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Attempting {
                mode: AttemptMode::UsingSubscription,
                ..
            } => f.write_str("attempting(subscription)"),
            Self::Attempting {
                mode: AttemptMode::UsingFreshPayment,
                is_retry: false,
            } => f.write_str("attempting(fresh payment)"),
            Self::Attempting {
                mode: AttemptMode::UsingFreshPayment,
                is_retry: true,
            } => f.write_str("attempting(fresh payment, retry)"),
            Self::RetryPending => f.write_str("retry pending"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Failed => f.write_str("failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Why a protected call failed, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The server reported the subscription expired, exhausted, or unknown.
    SubscriptionInvalid(SubscriptionError),
    /// The server rejected the payment authorization (HTTP 402).
    PaymentVerification,
    /// The request was malformed or otherwise refused (4xx).
    Validation,
    /// The request never reached the server or the connection broke.
    Network,
    /// The request timed out.
    Timeout,
    /// The server failed (5xx).
    Backend,
    /// Anything else.
    Other,
}

impl FailureClass {
    /// Whether a fresh payment could fix the failure.
    #[must_use]
    pub const fn is_subscription_invalid(&self) -> bool {
        match self {
            Self::SubscriptionInvalid(err) => err.invalidates_subscription(),
            _ => false,
        }
    }
}

impl From<SubscriptionError> for FailureClass {
    fn from(err: SubscriptionError) -> Self {
        if err.invalidates_subscription() {
            Self::SubscriptionInvalid(err)
        } else {
            Self::Validation
        }
    }
}

/// Inputs to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryEvent {
    /// The call starts with the selected subscription.
    StartWithSubscription,
    /// The call starts with a freshly signed authorization.
    StartWithPayment,
    /// The protected call was served.
    Served,
    /// The protected call failed.
    Failed(FailureClass),
    /// Backoff elapsed and a fresh authorization was signed.
    Resigned,
    /// The payer declined to sign.
    SigningCancelled,
    /// No authorization could be produced.
    SigningFailed,
}

/// An event that has no transition from the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No transition from {state} on {event:?}")]
pub struct InvalidTransition {
    /// State the machine was in.
    pub state: RetryState,
    /// Offending event.
    pub event: RetryEvent,
}

/// The transition table.
///
/// Only a first attempt that fails with an invalid subscription moves to
/// [`RetryState::RetryPending`]; every other failure is terminal.
///
/// # Errors
///
/// Returns [`InvalidTransition`] for events the table does not accept in `state`.
pub const fn transition(
    state: RetryState,
    event: RetryEvent,
) -> Result<RetryState, InvalidTransition> {
    use RetryEvent as E;
    use RetryState as S;

    let next = match (state, event) {
        (S::Idle, E::StartWithSubscription) => S::Attempting {
            mode: AttemptMode::UsingSubscription,
            is_retry: false,
        },
        (S::Idle, E::StartWithPayment) => S::Attempting {
            mode: AttemptMode::UsingFreshPayment,
            is_retry: false,
        },
        (S::Idle | S::RetryPending, E::SigningCancelled) => S::Cancelled,
        (S::Idle | S::RetryPending, E::SigningFailed) => S::Failed,
        (S::Attempting { .. }, E::Served) => S::Succeeded,
        (S::Attempting { is_retry: false, .. }, E::Failed(class))
            if class.is_subscription_invalid() =>
        {
            S::RetryPending
        }
        (S::Attempting { .. }, E::Failed(_)) => S::Failed,
        (S::RetryPending, E::Resigned) => S::Attempting {
            mode: AttemptMode::UsingFreshPayment,
            is_retry: true,
        },
        _ => return Err(InvalidTransition { state, event }),
    };
    Ok(next)
}

/// A running instance of the table, counting attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryMachine {
    state: RetryState,
    attempts: u8,
}

impl Default for RetryMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryMachine {
    /// A machine in [`RetryState::Idle`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RetryState::Idle,
            attempts: 0,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RetryState {
        self.state
    }

    /// Protected calls started so far.
    #[must_use]
    pub const fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Applies `event` and returns the new state.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] and leaves the machine unchanged if the
    /// table rejects the event.
    pub fn apply(&mut self, event: RetryEvent) -> Result<RetryState, InvalidTransition> {
        let next = transition(self.state, event)?;
        if matches!(next, RetryState::Attempting { .. }) {
            self.attempts += 1;
        }
        #[cfg(feature = "telemetry")]
        tracing::trace!(from = %self.state, to = %next, "retry transition");
        self.state = next;
        Ok(next)
    }
}
