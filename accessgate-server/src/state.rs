//! Shared server state: the pull-payment ledger and the subscription table.
//!
//! Every payment header is redeemed through the ledger before a subscription
//! is opened for it. The ledger lock is held from the duplicate check to the
//! insert, so one authorization opens at most one subscription.

use std::sync::Arc;

use accessgate::config::SubscriptionPolicy;
use accessgate::error::SubscriptionError;
use accessgate::ledger::{Call, PullPaymentLedger};
use accessgate::subscription::{DataScope, Subscription, SubscriptionRecord, SubscriptionStore};
use accessgate::timestamp::UnixTimestamp;
use accessgate_evm::abi::payment_tx_hash;
use accessgate_evm::chain::TokenDomain;
use accessgate_evm::{AuthorizationBundle, AuthorizationKind, Erc3009Token};
use alloy_primitives::{Address, U256};
use tokio::sync::{Mutex, MutexGuard};

use crate::config::{ConfigError, ServerConfig};
use crate::error::{PaymentError, ServerError};

/// Shared application state.
pub type SharedState = Arc<AppState>;

/// Ledger, subscriptions, and pricing of one quota server.
#[derive(Debug)]
pub struct AppState {
    ledger: Mutex<PullPaymentLedger<Erc3009Token>>,
    store: SubscriptionStore,
    domain: TokenDomain,
    payee: Address,
    operator: Address,
    policy: SubscriptionPolicy,
    price: U256,
    resources: Vec<String>,
}

impl AppState {
    /// State around an existing ledger.
    ///
    /// `price` is charged when a protected call pays inline; `resources`
    /// lists the names served under `/protected/{resource}`.
    #[must_use]
    pub fn new(
        ledger: PullPaymentLedger<Erc3009Token>,
        operator: Address,
        policy: SubscriptionPolicy,
        price: U256,
        resources: Vec<String>,
    ) -> Self {
        Self {
            domain: ledger.funds().domain().clone(),
            payee: ledger.address(),
            ledger: Mutex::new(ledger),
            store: SubscriptionStore::new(),
            operator,
            policy,
            price,
            resources,
        }
    }

    /// Builds the token with its genesis balances and the ledger on top of it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an amount, address, or the token domain does
    /// not resolve.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigError> {
        let mut token = Erc3009Token::new(config.token_domain()?);
        for (account, amount) in config.genesis_balances()? {
            token.mint(account, amount);
        }
        let ledger_config = config.ledger_config()?;
        let ledger = PullPaymentLedger::from_config(&ledger_config, token);
        Ok(Self::new(
            ledger,
            ledger_config.owner,
            config.subscription,
            config.price_units()?,
            config.resources.clone(),
        ))
    }

    /// The subscription table.
    #[must_use]
    pub const fn store(&self) -> &SubscriptionStore {
        &self.store
    }

    /// Locks the ledger.
    pub async fn ledger(&self) -> MutexGuard<'_, PullPaymentLedger<Erc3009Token>> {
        self.ledger.lock().await
    }

    /// Default subscription policy.
    #[must_use]
    pub const fn policy(&self) -> SubscriptionPolicy {
        self.policy
    }

    /// Inline protected-call price in token units.
    #[must_use]
    pub const fn price(&self) -> U256 {
        self.price
    }

    /// Whether `resource` is served.
    #[must_use]
    pub fn serves(&self, resource: &str) -> bool {
        self.resources.iter().any(|r| r == resource)
    }

    /// Redeems `payment_header` through the ledger and opens a subscription
    /// for it.
    ///
    /// The subscription is keyed by the payment's transaction hash and owned
    /// by the payer. A payer redeeming for the first time is also issued an
    /// access credential.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Payment`] if the header does not decode, names
    /// another token, network or payee, does not cover `expected`, or is
    /// refused by the ledger; and [`SubscriptionError::AlreadyExists`] if it
    /// was already redeemed here.
    pub async fn accept_payment(
        &self,
        payment_header: &str,
        scope: DataScope,
        expected: U256,
        policy: SubscriptionPolicy,
        now: UnixTimestamp,
    ) -> Result<SubscriptionRecord, ServerError> {
        let bundle = AuthorizationBundle::decode(payment_header).map_err(PaymentError::from)?;
        self.check_bundle(&bundle, expected)?;
        let signed = bundle.signed().map_err(PaymentError::from)?;
        let tx_hash = payment_tx_hash(AuthorizationKind::Receive, &signed);
        let payer = signed.authorization.from;

        let mut ledger = self.ledger.lock().await;
        if self.store.scope_of(&tx_hash).is_ok() {
            return Err(SubscriptionError::AlreadyExists.into());
        }
        ledger.redeem_authorization(&Call::new(self.operator, now), &signed.redeem_call())?;
        tracing::info!(%payer, %tx_hash, value = %signed.authorization.value, "payment redeemed");

        if ledger.can_mint(payer) {
            match ledger.mint_access_credential(&Call::new(payer, now)) {
                Ok(id) => tracing::info!(%payer, %id, "access credential issued"),
                Err(err) => tracing::warn!(%payer, %err, "credential not issued"),
            }
        }

        let subscription = Subscription::new(tx_hash, payer, scope, policy, now);
        let record = self.store.create(subscription, now)?;
        drop(ledger);
        Ok(record)
    }

    fn check_bundle(&self, bundle: &AuthorizationBundle, expected: U256) -> Result<(), PaymentError> {
        if bundle.kind != AuthorizationKind::Receive {
            return Err(PaymentError::UnsupportedKind);
        }
        if bundle.chain_id() != Some(self.domain.chain_id) {
            return Err(PaymentError::WrongNetwork {
                expected: self.domain.network(),
                got: bundle.network.clone(),
            });
        }
        if bundle.token != self.domain.verifying_contract {
            return Err(PaymentError::WrongToken {
                expected: self.domain.verifying_contract,
                got: bundle.token,
            });
        }
        if bundle.message.to != self.payee {
            return Err(PaymentError::WrongPayee {
                expected: self.payee,
                got: bundle.message.to,
            });
        }
        if bundle.message.value < expected {
            return Err(PaymentError::Underpaid {
                sent: bundle.message.value,
                required: expected,
            });
        }
        Ok(())
    }
}
