// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Distributed mutex used to keep concurrent callers from recomputing the same key.
//!
//! The lock lives in the shared store as `lock:<key>`, holding a random owner
//! token and a lease after which the store drops it on its own. Only the owner
//! can release it, so a holder whose lease ran out never frees a lock that
//! someone else has since taken.
//!
//! Callers that lose the race poll for the winner's result through
//! [`LockCoordinator::wait_for`] until their wait budget runs out.

use std::{fmt, sync::Arc, time::Duration};

use strata_tier::{Error, SharedStore};
use tick::Clock;
use uuid::Uuid;

/// Prefix of every lock resource.
pub const LOCK_PREFIX: &str = "lock:";

/// Returns the lock resource guarding `key`.
#[must_use]
pub fn lock_resource(key: &str) -> String {
    format!("{LOCK_PREFIX}{key}")
}

/// Identity of one lock acquisition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockToken {
    resource: String,
    owner: String,
    lease: Duration,
}

impl LockToken {
    fn new(key: &str, lease: Duration) -> Self {
        Self {
            resource: lock_resource(key),
            owner: Uuid::new_v4().to_string(),
            lease,
        }
    }

    /// The store key holding the lock.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The owner token, unique to this acquisition attempt.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// How long the store keeps the lock if it is never released.
    #[must_use]
    pub const fn lease(&self) -> Duration {
        self.lease
    }
}

/// Result of trying to take the lock for a key.
pub enum LockOutcome<S: SharedStore + 'static> {
    /// The lock is held until the guard is released or dropped.
    Acquired(LockGuard<S>),
    /// Someone else holds the lock.
    NotAcquired,
    /// The store could not be asked.
    Unavailable(Error),
}

impl<S: SharedStore + 'static> fmt::Debug for LockOutcome<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acquired(guard) => f.debug_tuple("Acquired").field(guard).finish(),
            Self::NotAcquired => f.write_str("NotAcquired"),
            Self::Unavailable(error) => f.debug_tuple("Unavailable").field(error).finish(),
        }
    }
}

/// A held lock.
///
/// Call [`release`](Self::release) when done. A guard dropped without being
/// released (a cancelled or panicking holder) spawns the release on the
/// current tokio runtime; outside a runtime the lock is left to its lease.
pub struct LockGuard<S: SharedStore + 'static> {
    store: Arc<S>,
    token: Option<LockToken>,
}

impl<S: SharedStore + 'static> fmt::Debug for LockGuard<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard").field("token", &self.token).finish_non_exhaustive()
    }
}

impl<S: SharedStore + 'static> LockGuard<S> {
    /// Returns the token of this acquisition.
    #[must_use]
    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    /// Releases the lock if this guard still owns it.
    ///
    /// Returns `false` when the lease had already expired and the lock was
    /// gone or taken by someone else.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be reached; the lock then
    /// expires with its lease.
    pub async fn release(mut self) -> Result<bool, Error> {
        let Some(token) = self.token.take() else {
            return Ok(false);
        };
        self.store.release(&token.resource, &token.owner).await
    }
}

impl<S: SharedStore + 'static> Drop for LockGuard<S> {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let store = Arc::clone(&self.store);
                tracing::debug!(lock.resource = token.resource.as_str(), "releasing abandoned lock");
                handle.spawn(async move {
                    if let Err(error) = store.release(&token.resource, &token.owner).await {
                        tracing::warn!(lock.resource = token.resource.as_str(), lock.error = %error, "abandoned lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(
                    lock.resource = token.resource.as_str(),
                    "abandoned lock outside a runtime expires with its lease"
                );
            }
        }
    }
}

/// What one poll of a waiting caller found.
#[derive(Debug)]
pub enum Check<V> {
    /// The value is available.
    Ready(V),
    /// Nothing yet; keep waiting.
    Pending,
    /// Waiting cannot succeed; stop now.
    Abort,
}

/// How a wait ended.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitOutcome<V> {
    /// A check found the value.
    Ready(V),
    /// The wait budget ran out.
    TimedOut,
    /// A check asked to stop.
    Aborted,
}

/// Takes locks and runs lock waits against a shared store.
pub struct LockCoordinator<S> {
    store: Arc<S>,
    clock: Clock,
    lease: Duration,
    poll_interval: Duration,
    wait_budget: Duration,
}

impl<S> fmt::Debug for LockCoordinator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("lease", &self.lease)
            .field("poll_interval", &self.poll_interval)
            .field("wait_budget", &self.wait_budget)
            .finish_non_exhaustive()
    }
}

impl<S: SharedStore + 'static> LockCoordinator<S> {
    /// Creates a coordinator.
    #[must_use]
    pub fn new(store: Arc<S>, clock: Clock, lease: Duration, poll_interval: Duration, wait_budget: Duration) -> Self {
        Self {
            store,
            clock,
            lease,
            poll_interval,
            wait_budget,
        }
    }

    /// Tries once to take the lock guarding `key`, with a fresh owner token.
    pub async fn try_acquire(&self, key: &str) -> LockOutcome<S> {
        let token = LockToken::new(key, self.lease);
        match self.store.try_acquire(&token.resource, &token.owner, token.lease).await {
            Ok(true) => LockOutcome::Acquired(LockGuard {
                store: Arc::clone(&self.store),
                token: Some(token),
            }),
            Ok(false) => LockOutcome::NotAcquired,
            Err(error) => LockOutcome::Unavailable(error),
        }
    }

    /// Returns `true` while some caller holds the lock guarding `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store could not be reached.
    pub async fn is_locked(&self, key: &str) -> Result<bool, Error> {
        Ok(self.store.get(&lock_resource(key)).await?.is_some())
    }

    /// Calls `check` every poll interval until it yields a value, aborts, or the wait budget is spent.
    ///
    /// The first check runs one interval after the call. Dropping the returned
    /// future stops the wait; nothing is left behind in the store.
    pub async fn wait_for<V, P, Fut>(&self, mut check: P) -> WaitOutcome<V>
    where
        P: FnMut() -> Fut,
        Fut: Future<Output = Check<V>>,
    {
        let stopwatch = self.clock.stopwatch();
        loop {
            let remaining = self.wait_budget.saturating_sub(stopwatch.elapsed());
            if remaining.is_zero() {
                return WaitOutcome::TimedOut;
            }

            self.clock.delay(self.poll_interval.min(remaining)).await;

            match check().await {
                Check::Ready(value) => return WaitOutcome::Ready(value),
                Check::Pending => {}
                Check::Abort => return WaitOutcome::Aborted,
            }
        }
    }
}
