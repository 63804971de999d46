//! Subscription quota tracking.
//!
//! A subscription is created together with a verified payment and buys a
//! fixed number of protected calls within a time window. It moves
//! `Created → Active → Exhausted | Expired`; both end states are terminal.
//!
//! Quota is taken in two steps. [`SubscriptionStore::reserve`] atomically
//! takes one unit before the protected call runs; the returned
//! [`Reservation`] is then committed when the call was served, or released
//! when it failed so the unit goes back. Two concurrent calls racing for the
//! last unit therefore cannot both succeed: the loser observes
//! [`SubscriptionError::Exhausted`].

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, B256};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};

use crate::config::SubscriptionPolicy;
use crate::error::SubscriptionError;
use crate::timestamp::UnixTimestamp;

/// What a subscription grants access to: exactly one agent or one dataroom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataScope {
    /// A single agent.
    #[serde(rename = "agent_id")]
    Agent(String),
    /// A single dataroom.
    #[serde(rename = "dataroom_id")]
    Dataroom(String),
}

impl DataScope {
    /// The scoped resource id.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Agent(id) | Self::Dataroom(id) => id,
        }
    }
}

impl fmt::Display for DataScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent(id) => write!(f, "agent:{id}"),
            Self::Dataroom(id) => write!(f, "dataroom:{id}"),
        }
    }
}

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// No call has been served or reserved yet.
    Created,
    /// At least one call has been reserved or served.
    Active,
    /// Every query has been spent. Terminal.
    Exhausted,
    /// The expiration time has passed. Terminal.
    Expired,
}

impl SubscriptionStatus {
    /// Whether the state can never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Expired)
    }
}

/// A quota-bound subscription keyed by its payment transaction hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    tx_hash: B256,
    owner: Address,
    data_scope: DataScope,
    query_limit: u32,
    queries_remaining: u32,
    in_flight: u32,
    activated: bool,
    created_at: UnixTimestamp,
    expires_at: UnixTimestamp,
    terminal: Option<SubscriptionStatus>,
}

impl Subscription {
    /// A fresh subscription for the payment `tx_hash`, sized by `policy`.
    #[must_use]
    pub fn new(
        tx_hash: B256,
        owner: Address,
        data_scope: DataScope,
        policy: SubscriptionPolicy,
        now: UnixTimestamp,
    ) -> Self {
        Self {
            tx_hash,
            owner,
            data_scope,
            query_limit: policy.query_limit,
            queries_remaining: policy.query_limit,
            in_flight: 0,
            activated: false,
            created_at: now,
            expires_at: now.plus_days(policy.expiration_days),
            terminal: (policy.query_limit == 0).then_some(SubscriptionStatus::Exhausted),
        }
    }

    /// Payment transaction hash.
    #[must_use]
    pub const fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    /// Payer who owns the subscription.
    #[must_use]
    pub const fn owner(&self) -> Address {
        self.owner
    }

    /// Resource the subscription is scoped to.
    #[must_use]
    pub const fn data_scope(&self) -> &DataScope {
        &self.data_scope
    }

    /// Calls bought.
    #[must_use]
    pub const fn query_limit(&self) -> u32 {
        self.query_limit
    }

    /// Calls neither served nor reserved.
    #[must_use]
    pub const fn queries_remaining(&self) -> u32 {
        self.queries_remaining
    }

    /// Expiration time; the subscription is usable up to and including it.
    #[must_use]
    pub const fn expires_at(&self) -> UnixTimestamp {
        self.expires_at
    }

    /// Whether the subscription is past `expires_at` at `now`.
    #[must_use]
    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        self.terminal == Some(SubscriptionStatus::Expired)
            || (self.terminal.is_none() && now > self.expires_at)
    }

    /// Whether every query has been spent.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.terminal == Some(SubscriptionStatus::Exhausted)
    }

    /// `!expired && !exhausted && queriesRemaining > 0`.
    #[must_use]
    pub fn is_valid(&self, now: UnixTimestamp) -> bool {
        !self.is_expired(now) && !self.is_exhausted() && self.queries_remaining > 0
    }

    /// Lifecycle state at `now`.
    #[must_use]
    pub fn status(&self, now: UnixTimestamp) -> SubscriptionStatus {
        if let Some(terminal) = self.terminal {
            terminal
        } else if now > self.expires_at {
            SubscriptionStatus::Expired
        } else if self.activated {
            SubscriptionStatus::Active
        } else {
            SubscriptionStatus::Created
        }
    }

    /// Wire view at `now`.
    #[must_use]
    pub fn record(&self, now: UnixTimestamp) -> SubscriptionRecord {
        SubscriptionRecord {
            tx_hash: self.tx_hash,
            queries_remaining: self.queries_remaining,
            query_limit: self.query_limit,
            expires_at: self.expires_at,
            is_valid: self.is_valid(now),
            is_expired: self.is_expired(now),
            is_exhausted: self.is_exhausted(),
            created_at: Some(self.created_at),
        }
    }

    /// Latches `Expired` once the window has passed.
    fn refresh(&mut self, now: UnixTimestamp) {
        if self.terminal.is_none() && now > self.expires_at {
            self.terminal = Some(SubscriptionStatus::Expired);
        }
    }

    fn try_reserve(&mut self, now: UnixTimestamp) -> Result<(), SubscriptionError> {
        self.refresh(now);
        match self.terminal {
            Some(SubscriptionStatus::Expired) => return Err(SubscriptionError::Expired),
            Some(SubscriptionStatus::Exhausted) => return Err(SubscriptionError::Exhausted),
            _ => {}
        }
        if self.queries_remaining == 0 {
            return Err(SubscriptionError::Exhausted);
        }
        self.queries_remaining -= 1;
        self.in_flight += 1;
        self.activated = true;
        Ok(())
    }

    fn commit_unit(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.queries_remaining == 0 && self.in_flight == 0 && self.terminal.is_none() {
            self.terminal = Some(SubscriptionStatus::Exhausted);
        }
    }

    fn release_unit(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if !self.is_exhausted() {
            self.queries_remaining += 1;
        }
    }
}

/// Serialized view of a subscription, as returned by the quota server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Payment transaction hash.
    pub tx_hash: B256,
    /// Calls left.
    pub queries_remaining: u32,
    /// Calls bought.
    pub query_limit: u32,
    /// Expiration time.
    pub expires_at: UnixTimestamp,
    /// Whether a protected call would currently be accepted.
    pub is_valid: bool,
    /// Whether the subscription has expired.
    pub is_expired: bool,
    /// Whether the subscription has been used up.
    pub is_exhausted: bool,
    /// Creation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<UnixTimestamp>,
}

impl SubscriptionRecord {
    /// Whether the flags agree with each other and with the counters.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        let predicate = !self.is_expired && !self.is_exhausted && self.queries_remaining > 0;
        self.queries_remaining <= self.query_limit
            && self.is_valid == predicate
            && !(self.is_exhausted && self.queries_remaining > 0)
    }

    /// The error a protected call against this record would be expected to
    /// hit, if any. Expiry wins over exhaustion.
    #[must_use]
    pub const fn invalid_reason(&self) -> Option<SubscriptionError> {
        if self.is_expired {
            Some(SubscriptionError::Expired)
        } else if self.is_exhausted || self.queries_remaining == 0 {
            Some(SubscriptionError::Exhausted)
        } else {
            None
        }
    }
}

/// Concurrent subscription table keyed by payment transaction hash.
///
/// Cloning is cheap; clones share the same table.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionStore {
    inner: Arc<DashMap<B256, Subscription>>,
}

impl SubscriptionStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a subscription created for a verified payment.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::AlreadyExists`] if the transaction hash
    /// already has a subscription.
    pub fn create(
        &self,
        subscription: Subscription,
        now: UnixTimestamp,
    ) -> Result<SubscriptionRecord, SubscriptionError> {
        match self.inner.entry(subscription.tx_hash) {
            Entry::Occupied(_) => Err(SubscriptionError::AlreadyExists),
            Entry::Vacant(vacant) => {
                #[cfg(feature = "telemetry")]
                tracing::info!(
                    tx_hash = %subscription.tx_hash,
                    scope = %subscription.data_scope,
                    query_limit = subscription.query_limit,
                    "subscription created"
                );
                let record = subscription.record(now);
                vacant.insert(subscription);
                Ok(record)
            }
        }
    }

    /// Current view of a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`].
    pub fn get(
        &self,
        tx_hash: &B256,
        now: UnixTimestamp,
    ) -> Result<SubscriptionRecord, SubscriptionError> {
        let mut entry = self
            .inner
            .get_mut(tx_hash)
            .ok_or(SubscriptionError::NotFound)?;
        entry.refresh(now);
        Ok(entry.record(now))
    }

    /// Owner and scope of a subscription.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`].
    pub fn scope_of(&self, tx_hash: &B256) -> Result<(Address, DataScope), SubscriptionError> {
        let entry = self.inner.get(tx_hash).ok_or(SubscriptionError::NotFound)?;
        Ok((entry.owner, entry.data_scope.clone()))
    }

    /// Atomically takes one unit of quota.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`], [`SubscriptionError::Expired`],
    /// or [`SubscriptionError::Exhausted`].
    pub fn reserve(
        &self,
        tx_hash: &B256,
        now: UnixTimestamp,
    ) -> Result<Reservation, SubscriptionError> {
        let mut entry = self
            .inner
            .get_mut(tx_hash)
            .ok_or(SubscriptionError::NotFound)?;
        let reserved = entry.try_reserve(now);
        #[cfg(feature = "telemetry")]
        match &reserved {
            Ok(()) => tracing::debug!(
                %tx_hash,
                remaining = entry.queries_remaining,
                "quota unit reserved"
            ),
            Err(err) => tracing::info!(%tx_hash, %err, "subscription rejected call"),
        }
        drop(entry);
        reserved.map(|()| Reservation {
            store: self.clone(),
            tx_hash: *tx_hash,
            settled: false,
        })
    }

    /// Reserves and immediately commits one unit.
    ///
    /// # Errors
    ///
    /// Same as [`SubscriptionStore::reserve`].
    pub fn consume(
        &self,
        tx_hash: &B256,
        now: UnixTimestamp,
    ) -> Result<SubscriptionRecord, SubscriptionError> {
        self.reserve(tx_hash, now)?.commit(now)
    }

    /// Removes expired subscriptions with no call in flight. Returns how many
    /// were removed.
    pub fn purge_expired(&self, now: UnixTimestamp) -> usize {
        let mut removed = 0;
        self.inner.retain(|_, subscription| {
            subscription.refresh(now);
            let keep = !subscription.is_expired(now) || subscription.in_flight > 0;
            if !keep {
                removed += 1;
            }
            keep
        });
        #[cfg(feature = "telemetry")]
        if removed > 0 {
            tracing::debug!(removed, "purged expired subscriptions");
        }
        removed
    }

    /// Number of stored subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn settle(&self, tx_hash: &B256, commit: bool) -> Option<Subscription> {
        let mut entry = self.inner.get_mut(tx_hash)?;
        if commit {
            entry.commit_unit();
            #[cfg(feature = "telemetry")]
            if entry.is_exhausted() {
                tracing::info!(%tx_hash, "subscription exhausted");
            }
        } else {
            entry.release_unit();
        }
        Some(entry.clone())
    }
}

/// One unit of quota held for an in-flight protected call.
///
/// Dropping an unsettled reservation releases it.
#[derive(Debug)]
#[must_use = "an unsettled reservation is released on drop"]
pub struct Reservation {
    store: SubscriptionStore,
    tx_hash: B256,
    settled: bool,
}

impl Reservation {
    /// Subscription the unit was taken from.
    pub const fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    /// Marks the unit as spent.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionError::NotFound`] if the subscription vanished.
    pub fn commit(mut self, now: UnixTimestamp) -> Result<SubscriptionRecord, SubscriptionError> {
        self.settled = true;
        self.store
            .settle(&self.tx_hash, true)
            .map(|subscription| subscription.record(now))
            .ok_or(SubscriptionError::NotFound)
    }

    /// Returns the unit after a failed call.
    pub fn release(mut self) {
        self.settled = true;
        self.store.settle(&self.tx_hash, false);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.store.settle(&self.tx_hash, false);
        }
    }
}
