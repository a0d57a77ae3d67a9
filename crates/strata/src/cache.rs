// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The two-tier cache facade.

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};
use strata_tier::{LocalTier, SharedStore, Tier};
use tick::Clock;

use crate::{
    builder::CacheBuilder,
    codec::JsonCodec,
    invalidate::{self, PrefixRemoval},
    jitter::TtlJitter,
    lock::{Check, LockCoordinator, LockGuard, LockOutcome, WaitOutcome},
    options::{CacheOptions, EntryTtl},
    telemetry::{CacheActivity, CacheOperation, CacheTelemetry},
};

/// Type alias for cache names used in telemetry.
pub type CacheName = &'static str;

pub(crate) const DEFAULT_NAME: CacheName = "strata";

/// A typed cache over an in-process local tier and a shared store.
///
/// Reads try the local tier, then the shared tier (refilling the local tier on
/// a hit). [`get_or_create`](Self::get_or_create) computes missing values
/// under a distributed lock so that concurrent callers, in this process or
/// others, run the factory once per key. Shared-store failures never reach the
/// caller: the cache degrades to running the factory and serving from the
/// local tier, logging a warning.
///
/// Values are stored as JSON in both tiers.
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
///
/// use strata::{Cache, EntryTtl};
/// use strata_tier::testing::MockStore;
/// use tick::Clock;
///
/// # futures::executor::block_on(async {
/// let cache = Cache::builder(Clock::new_frozen())
///     .memory()
///     .shared(MockStore::new())
///     .build()
///     .unwrap();
///
/// let answer: String = cache
///     .get_or_create("prompt:42", || async { Ok::<_, Infallible>("forty-two".to_string()) }, EntryTtl::new())
///     .await
///     .unwrap();
/// assert_eq!(answer, "forty-two");
/// assert_eq!(cache.get::<String>("prompt:42").await.as_deref(), Some("forty-two"));
/// # });
/// ```
pub struct Cache<L, S> {
    pub(crate) name: CacheName,
    pub(crate) local: L,
    pub(crate) shared: Arc<S>,
    pub(crate) options: CacheOptions,
    pub(crate) jitter: TtlJitter,
    pub(crate) locks: LockCoordinator<S>,
    pub(crate) telemetry: CacheTelemetry,
    pub(crate) codec: JsonCodec,
}

impl<L, S> fmt::Debug for Cache<L, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("jitter", &self.jitter)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl Cache<(), ()> {
    /// Creates a new cache builder.
    ///
    /// The clock drives lock waits. In production pass a runtime clock such
    /// as `Clock::new_tokio()`.
    ///
    /// # Examples
    ///
    /// ```
    /// use strata::{Cache, CacheOptions};
    /// use strata_tier::testing::MockStore;
    /// use tick::Clock;
    ///
    /// let mut options = CacheOptions::default();
    /// options.namespace = "AgentApi:".to_string();
    ///
    /// let cache = Cache::builder(Clock::new_frozen())
    ///     .name("agent")
    ///     .options(options)
    ///     .memory()
    ///     .shared(MockStore::new())
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(cache.name(), "agent");
    /// ```
    #[must_use]
    pub fn builder(clock: Clock) -> CacheBuilder {
        CacheBuilder::new(clock)
    }
}

enum SharedRead<V> {
    Hit(V),
    Miss,
    Unavailable,
}

impl<L, S> Cache<L, S>
where
    L: LocalTier,
    S: SharedStore + 'static,
{
    pub(crate) fn new(name: CacheName, clock: Clock, options: CacheOptions, local: L, shared: S) -> Self {
        let shared = Arc::new(shared);
        let locks = LockCoordinator::new(
            Arc::clone(&shared),
            clock,
            options.lock_lease,
            options.lock_poll_interval,
            options.lock_wait_budget,
        );
        Self {
            name,
            local,
            shared,
            jitter: TtlJitter::new(options.jitter_min, options.jitter_max),
            locks,
            options,
            telemetry: CacheTelemetry::new(name),
            codec: JsonCodec,
        }
    }

    /// Returns the name of this cache.
    #[must_use]
    pub fn name(&self) -> CacheName {
        self.name
    }

    /// Returns the options this cache was built with.
    #[must_use]
    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Returns the local tier.
    #[must_use]
    pub fn local_tier(&self) -> &L {
        &self.local
    }

    /// Returns the shared store.
    #[must_use]
    pub fn shared_store(&self) -> &S {
        &self.shared
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    ///
    /// On a miss in both tiers only one caller across all processes runs
    /// `factory` at a time; the others wait for its result in the shared tier
    /// and, if it does not show up within the lock wait budget, run `factory`
    /// themselves. When the shared store is unreachable every caller runs
    /// `factory` and the result is kept in the local tier.
    ///
    /// # Errors
    ///
    /// Returns the factory's error unchanged. Failed results are not cached.
    pub async fn get_or_create<V, E, F, Fut>(&self, key: &str, factory: F, ttl: EntryTtl) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send,
    {
        const OP: CacheOperation = CacheOperation::GetOrCreate;

        if let Some(value) = self.read_local(OP, key).await {
            return Ok(value);
        }

        let shared_key = self.shared_key(key);
        if let SharedRead::Hit(value) = self.read_shared(OP, key, &shared_key).await {
            return Ok(value);
        }
        self.telemetry.record(OP, CacheActivity::Miss, Tier::Shared, key);

        match self.locks.try_acquire(&shared_key).await {
            LockOutcome::Acquired(guard) => self.create_locked(key, &shared_key, guard, factory, ttl).await,
            LockOutcome::NotAcquired => {
                self.telemetry.record(OP, CacheActivity::LockContended, Tier::Shared, key);
                match self.wait_for_winner(key, &shared_key).await {
                    Some(value) => Ok(value),
                    None => self.create_unlocked(key, &shared_key, factory, ttl).await,
                }
            }
            LockOutcome::Unavailable(error) => {
                self.telemetry.record_error(OP, CacheActivity::Fallback, Tier::Shared, key, &error);
                self.create_unlocked(key, &shared_key, factory, ttl).await
            }
        }
    }

    /// Returns the cached value for `key`, if either tier has a decodable one.
    ///
    /// A shared-tier hit refills the local tier. An unreachable shared store
    /// reads as a miss.
    pub async fn get<V>(&self, key: &str) -> Option<V>
    where
        V: DeserializeOwned,
    {
        const OP: CacheOperation = CacheOperation::Get;

        if let Some(value) = self.read_local(OP, key).await {
            return Some(value);
        }

        match self.read_shared(OP, key, &self.shared_key(key)).await {
            SharedRead::Hit(value) => Some(value),
            SharedRead::Miss => {
                self.telemetry.record(OP, CacheActivity::Miss, Tier::Shared, key);
                None
            }
            SharedRead::Unavailable => None,
        }
    }

    /// Stores `value` in both tiers.
    ///
    /// The local write happens first; the shared write is best-effort and its
    /// failure is only logged.
    pub async fn set<V>(&self, key: &str, value: &V, ttl: EntryTtl)
    where
        V: Serialize + Sync,
    {
        self.write_through(CacheOperation::Set, key, &self.shared_key(key), value, ttl).await;
    }

    /// Removes `key` from both tiers. Removing an absent key is not an error.
    pub async fn remove(&self, key: &str) {
        const OP: CacheOperation = CacheOperation::Remove;

        match self.local.delete(key).await {
            Ok(()) => self.telemetry.record(OP, CacheActivity::Invalidated, Tier::Local, key),
            Err(error) => self.telemetry.record_error(OP, CacheActivity::LocalError, Tier::Local, key, &error),
        }

        match self.shared.delete(&self.shared_key(key)).await {
            Ok(()) => self.telemetry.record(OP, CacheActivity::Invalidated, Tier::Shared, key),
            Err(error) => self.telemetry.record_error(OP, CacheActivity::SharedError, Tier::Shared, key, &error),
        }
    }

    /// Removes every entry whose key starts with `prefix` from both tiers.
    ///
    /// The shared tier is swept with a cursor scan and batched deletes. A
    /// store failure stops the sweep early; the result then reports
    /// `complete: false` with what was removed so far.
    pub async fn remove_by_prefix(&self, prefix: &str) -> PrefixRemoval {
        const OP: CacheOperation = CacheOperation::RemoveByPrefix;

        let local = match self.local.invalidate_prefix(prefix).await {
            Ok(count) => count,
            Err(error) => {
                self.telemetry.record_error(OP, CacheActivity::LocalError, Tier::Local, prefix, &error);
                0
            }
        };

        let pattern = invalidate::prefix_pattern(&self.shared_key(prefix));
        let sweep = invalidate::sweep(&*self.shared, &pattern, self.options.scan_page_size, self.options.delete_batch_size).await;

        let complete = match &sweep.failure {
            None => {
                self.telemetry.record(OP, CacheActivity::Invalidated, Tier::Shared, prefix);
                true
            }
            Some(error) => {
                self.telemetry.record_error(OP, CacheActivity::SharedError, Tier::Shared, prefix, error);
                false
            }
        };

        PrefixRemoval {
            local,
            shared: sweep.removed,
            complete,
        }
    }

    /// Drops every local entry. The shared tier is untouched.
    pub async fn clear_local(&self) {
        if let Err(error) = self.local.clear().await {
            self.telemetry
                .record_error(CacheOperation::ClearLocal, CacheActivity::LocalError, Tier::Local, "", &error);
        }
    }

    fn shared_key(&self, key: &str) -> String {
        format!("{}{key}", self.options.namespace)
    }

    async fn create_locked<V, E, F, Fut>(&self, key: &str, shared_key: &str, guard: LockGuard<S>, factory: F, ttl: EntryTtl) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send,
    {
        const OP: CacheOperation = CacheOperation::GetOrCreate;
        self.telemetry.record(OP, CacheActivity::LockAcquired, Tier::Shared, key);

        // A previous holder may have stored the value while this caller was acquiring.
        if let SharedRead::Hit(value) = self.read_shared(OP, key, shared_key).await {
            self.release(key, guard).await;
            return Ok(value);
        }

        let result = factory().await;
        if let Ok(value) = &result {
            self.write_through(OP, key, shared_key, value, ttl).await;
        }
        self.release(key, guard).await;
        result
    }

    async fn create_unlocked<V, E, F, Fut>(&self, key: &str, shared_key: &str, factory: F, ttl: EntryTtl) -> Result<V, E>
    where
        V: Serialize + Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send,
    {
        let value = factory().await?;
        self.write_through(CacheOperation::GetOrCreate, key, shared_key, &value, ttl).await;
        Ok(value)
    }

    async fn wait_for_winner<V>(&self, key: &str, shared_key: &str) -> Option<V>
    where
        V: DeserializeOwned + Send,
    {
        const OP: CacheOperation = CacheOperation::GetOrCreate;

        let outcome = self
            .locks
            .wait_for(move || self.check_winner(key, shared_key))
            .await;

        match outcome {
            WaitOutcome::Ready(value) => {
                self.telemetry.record(OP, CacheActivity::StampedeWaitHit, Tier::Shared, key);
                Some(value)
            }
            WaitOutcome::TimedOut => {
                self.telemetry.record(OP, CacheActivity::WaitTimeout, Tier::Shared, key);
                None
            }
            WaitOutcome::Aborted => {
                self.telemetry.record(OP, CacheActivity::Fallback, Tier::Shared, key);
                None
            }
        }
    }

    /// One poll of a waiting caller: the winner's value, or a sign the winner is gone.
    async fn check_winner<V>(&self, key: &str, shared_key: &str) -> Check<V>
    where
        V: DeserializeOwned + Send,
    {
        const OP: CacheOperation = CacheOperation::GetOrCreate;

        match self.read_shared(OP, key, shared_key).await {
            SharedRead::Hit(value) => return Check::Ready(value),
            SharedRead::Unavailable => return Check::Abort,
            SharedRead::Miss => {}
        }

        match self.locks.is_locked(shared_key).await {
            Ok(true) => Check::Pending,
            // A holder writes its value before releasing, so read once more.
            Ok(false) => match self.read_shared(OP, key, shared_key).await {
                SharedRead::Hit(value) => Check::Ready(value),
                SharedRead::Miss | SharedRead::Unavailable => {
                    self.telemetry.record(OP, CacheActivity::LockVacated, Tier::Shared, key);
                    Check::Abort
                }
            },
            Err(error) => {
                self.telemetry.record_error(OP, CacheActivity::SharedError, Tier::Shared, key, &error);
                Check::Abort
            }
        }
    }

    async fn release(&self, key: &str, guard: LockGuard<S>) {
        const OP: CacheOperation = CacheOperation::GetOrCreate;

        match guard.release().await {
            Ok(true) => self.telemetry.record(OP, CacheActivity::LockReleased, Tier::Shared, key),
            Ok(false) => self.telemetry.record(OP, CacheActivity::LockLost, Tier::Shared, key),
            Err(error) => self.telemetry.record_error(OP, CacheActivity::SharedError, Tier::Shared, key, &error),
        }
    }

    async fn read_local<V: DeserializeOwned>(&self, op: CacheOperation, key: &str) -> Option<V> {
        let entry = match self.local.get(key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(error) => {
                self.telemetry.record_error(op, CacheActivity::LocalError, Tier::Local, key, &error);
                return None;
            }
        };

        match self.codec.decode(entry.value()) {
            Ok(value) => {
                self.telemetry.record(op, CacheActivity::HitLocal, Tier::Local, key);
                Some(value)
            }
            Err(error) => {
                self.telemetry.record_error(op, CacheActivity::Corrupt, Tier::Local, key, &error);
                if let Err(error) = self.local.delete(key).await {
                    self.telemetry.record_error(op, CacheActivity::LocalError, Tier::Local, key, &error);
                }
                None
            }
        }
    }

    async fn read_shared<V: DeserializeOwned>(&self, op: CacheOperation, key: &str, shared_key: &str) -> SharedRead<V> {
        let entry = match self.shared.get(shared_key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return SharedRead::Miss,
            Err(error) => {
                self.telemetry.record_error(op, CacheActivity::SharedError, Tier::Shared, key, &error);
                return SharedRead::Unavailable;
            }
        };

        match self.codec.decode(entry.value()) {
            Ok(value) => {
                self.telemetry.record(op, CacheActivity::HitShared, Tier::Shared, key);
                self.write_local(op, key, entry.into_value(), self.options.default_local_ttl).await;
                SharedRead::Hit(value)
            }
            Err(error) => {
                self.telemetry.record_error(op, CacheActivity::Corrupt, Tier::Shared, key, &error);
                if let Err(error) = self.shared.delete(shared_key).await {
                    self.telemetry.record_error(op, CacheActivity::SharedError, Tier::Shared, key, &error);
                }
                SharedRead::Miss
            }
        }
    }

    async fn write_through<V: Serialize + Sync>(&self, op: CacheOperation, key: &str, shared_key: &str, value: &V, ttl: EntryTtl) {
        let payload = match self.codec.encode(value) {
            Ok(payload) => payload,
            Err(error) => {
                self.telemetry.record_codec_error(op, CacheActivity::EncodeFailed, key, &error);
                return;
            }
        };

        let local_ttl = ttl.local_ttl().unwrap_or(self.options.default_local_ttl);
        self.write_local(op, key, payload.clone(), local_ttl).await;

        let shared_ttl = self.jitter.apply(ttl.shared_ttl().unwrap_or(self.options.default_shared_ttl));
        match self.shared.set(shared_key, payload, shared_ttl).await {
            Ok(()) => self.telemetry.record(op, CacheActivity::Inserted, Tier::Shared, key),
            Err(error) => self.telemetry.record_error(op, CacheActivity::SharedError, Tier::Shared, key, &error),
        }
    }

    async fn write_local(&self, op: CacheOperation, key: &str, payload: Bytes, ttl: Duration) {
        match self.local.set(key, payload, ttl).await {
            Ok(()) => self.telemetry.record(op, CacheActivity::Inserted, Tier::Local, key),
            Err(error) => self.telemetry.record_error(op, CacheActivity::LocalError, Tier::Local, key, &error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use futures::executor::block_on;
    use strata_memory::MemoryTier;
    use std::collections::HashMap;

    use strata_tier::{
        ByteTier, CacheEntry, Error,
        testing::{MockStore, StoreOp},
    };
    use tick::ClockControl;

    use super::*;
    use crate::{jitter::Rnd, telemetry::testing::LogCapture};

    fn cache_over(store: &MockStore) -> Cache<MemoryTier, MockStore> {
        Cache::builder(Clock::new_frozen())
            .name("test_cache")
            .memory()
            .shared(store.clone())
            .build()
            .unwrap()
    }

    fn shared_gets(store: &MockStore, key: &str) -> usize {
        store.count_ops(|op| matches!(op, StoreOp::Get(k) if k == key))
    }

    #[test]
    fn shared_outage_falls_back_to_the_factory() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = MockStore::new();
        store.fail_when(|_| true);
        let cache = cache_over(&store);
        let counter = AtomicUsize::new(0);
        let calls = &counter;

        let factory = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("computed".to_string())
        };
        let first = block_on(cache.get_or_create("k", factory, EntryTtl::new()));
        assert_eq!(first.as_deref(), Ok("computed"));

        let factory = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>("again".to_string())
        };
        let second = block_on(cache.get_or_create("k", factory, EntryTtl::new()));
        assert_eq!(second.as_deref(), Ok("computed"), "served from the local tier");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        capture.assert_contains("WARN");
        capture.assert_contains("cache.fallback");
        capture.assert_contains("cache.shared_error");
        capture.assert_contains("cache.hit_local");
    }

    #[test]
    fn shared_hit_refills_the_local_tier() {
        let store = MockStore::new();
        store.seed("k", r#""from-l2""#, None);
        let cache = cache_over(&store);

        assert_eq!(block_on(cache.get::<String>("k")).as_deref(), Some("from-l2"));
        assert_eq!(block_on(cache.get::<String>("k")).as_deref(), Some("from-l2"));

        assert_eq!(shared_gets(&store, "k"), 1);
    }

    #[test]
    fn corrupt_shared_entry_is_replaced() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = MockStore::new();
        store.seed("k", "{not json", None);
        let cache = cache_over(&store);

        let value = block_on(cache.get_or_create("k", || async { Ok::<_, String>("fresh".to_string()) }, EntryTtl::new()));

        assert_eq!(value.as_deref(), Ok("fresh"));
        assert_eq!(store.raw("k"), Some(Bytes::from_static(br#""fresh""#)));
        capture.assert_contains("ERROR");
        capture.assert_contains("cache.corrupt");
    }

    #[test]
    fn corrupt_entry_reads_as_miss() {
        let store = MockStore::new();
        store.seed("k", "\u{1}\u{2}", None);
        let cache = cache_over(&store);

        assert_eq!(block_on(cache.get::<u32>("k")), None);
        assert!(!store.contains_key("k"));
    }

    #[test]
    fn shared_writes_are_jittered() {
        let store = MockStore::new();
        let mut cache = cache_over(&store);
        cache.jitter = TtlJitter::new(cache.options.jitter_min, cache.options.jitter_max).with_rnd(Rnd::new_function(|_, high| high));

        block_on(cache.set("k", &7_u32, EntryTtl::new().shared(Duration::from_secs(3600))));

        assert_eq!(store.remaining_ttl("k"), Some(Duration::from_secs(3600 + 15 * 60)));
    }

    #[test]
    fn default_shared_ttl_is_jittered_within_bounds() {
        let store = MockStore::new();
        let cache = cache_over(&store);

        block_on(cache.set("k", &7_u32, EntryTtl::new()));

        let ttl = store.remaining_ttl("k").unwrap();
        let nominal = cache.options.default_shared_ttl;
        assert!(ttl >= nominal + cache.options.jitter_min, "{ttl:?}");
        assert!(ttl <= nominal + cache.options.jitter_max, "{ttl:?}");
    }

    #[test]
    fn factory_error_is_not_cached() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = MockStore::new();
        let cache = cache_over(&store);

        let result: Result<String, &str> = block_on(cache.get_or_create("k", || async { Err("boom") }, EntryTtl::new()));

        assert_eq!(result, Err("boom"));
        assert!(!store.contains_key("k"));
        assert!(!store.contains_key("lock:k"));
        assert_eq!(block_on(cache.local_tier().get("k")).unwrap(), None);
        capture.assert_contains("cache.lock_released");
    }

    #[test]
    fn double_check_under_lock_skips_the_factory() {
        let store = MockStore::new();
        let cache = cache_over(&store);

        // The value shows up only for the re-read made after the lock is taken.
        let seeder = store.clone();
        store.fail_when(move |op| {
            if matches!(op, StoreOp::TryAcquire { .. }) {
                seeder.seed("k", r#""winner""#, None);
            }
            false
        });

        let value = block_on(cache.get_or_create("k", || async { Ok::<_, String>("loser".to_string()) }, EntryTtl::new()));

        assert_eq!(value.as_deref(), Ok("winner"));
        assert!(!store.contains_key("lock:k"));
    }

    #[test]
    fn waiter_falls_back_after_wait_budget() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let control = ClockControl::new().auto_advance_timers(true);
        let store = MockStore::new();
        store.seed("lock:k", "other-process", Some(Duration::from_secs(10)));
        let cache = Cache::builder(control.to_clock())
            .memory()
            .shared(store.clone())
            .build()
            .unwrap();

        let value = block_on(cache.get_or_create("k", || async { Ok::<_, String>("mine".to_string()) }, EntryTtl::new()));

        assert_eq!(value.as_deref(), Ok("mine"));
        assert!(shared_gets(&store, "k") > 1, "waiter polled the shared tier");
        assert_eq!(store.raw("lock:k"), Some(Bytes::from_static(b"other-process")));
        capture.assert_contains("cache.lock_contended");
        capture.assert_contains("cache.wait_timeout");
    }

    #[test]
    fn namespace_prefixes_shared_keys_only() {
        let store = MockStore::new();
        let mut options = CacheOptions::default();
        options.namespace = "AgentApi:".to_string();
        let cache = Cache::builder(Clock::new_frozen())
            .options(options)
            .memory()
            .shared(store.clone())
            .build()
            .unwrap();

        block_on(cache.set("sess:1", &"state", EntryTtl::new()));

        assert!(store.contains_key("AgentApi:sess:1"));
        assert!(!store.contains_key("sess:1"));
        assert!(block_on(cache.local_tier().get("sess:1")).unwrap().is_some());
    }

    #[test]
    fn remove_clears_both_tiers() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = MockStore::new();
        let cache = cache_over(&store);
        block_on(cache.set("k", &1_u8, EntryTtl::new()));

        block_on(cache.remove("k"));
        block_on(cache.remove("never-written"));

        assert_eq!(block_on(cache.get::<u8>("k")), None);
        assert!(!store.contains_key("k"));
        capture.assert_contains("cache.invalidated");
    }

    #[test]
    fn failed_sweep_reports_incomplete() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = MockStore::new();
        let cache = cache_over(&store);
        block_on(cache.set("rag:1", &1_u8, EntryTtl::new()));
        store.fail_when(|op| matches!(op, StoreOp::Scan { .. }));

        let removal = block_on(cache.remove_by_prefix("rag:"));

        assert_eq!(removal.local, 1);
        assert_eq!(removal.shared, 0);
        assert!(!removal.complete);
        assert!(store.contains_key("rag:1"));
        capture.assert_contains("cache.shared_error");
    }

    #[test]
    fn clear_local_keeps_the_shared_tier() {
        let store = MockStore::new();
        let cache = cache_over(&store);
        block_on(cache.set("k", &1_u8, EntryTtl::new()));

        block_on(cache.clear_local());

        assert_eq!(block_on(cache.local_tier().get("k")).unwrap(), None);
        assert_eq!(block_on(cache.get::<u8>("k")), Some(1));
    }

    #[test]
    fn waiter_falls_back_once_the_lock_is_gone() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let control = ClockControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let store = MockStore::with_clock(clock.clone());
        // A holder whose factory failed: the lock goes away and no value is written.
        store.seed("lock:k", "failed-holder", Some(Duration::from_millis(120)));
        let cache = Cache::builder(clock.clone()).memory().shared(store.clone()).build().unwrap();
        let stopwatch = clock.stopwatch();

        let value = block_on(cache.get_or_create("k", || async { Ok::<_, String>("mine".to_string()) }, EntryTtl::new()));

        assert_eq!(value.as_deref(), Ok("mine"));
        assert!(stopwatch.elapsed() < Duration::from_secs(1), "waited {:?}", stopwatch.elapsed());
        assert_eq!(capture.count("cache.lock_vacated"), 1);
        assert_eq!(capture.count("cache.fallback"), 1);
        capture.assert_not_contains("cache.wait_timeout");
        assert_eq!(store.count_ops(|op| matches!(op, StoreOp::TryAcquire { .. })), 1);
    }

    #[test]
    fn value_written_before_release_is_served() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let control = ClockControl::new().auto_advance_timers(true);
        let clock = control.to_clock();
        let store = MockStore::with_clock(clock.clone());
        store.seed("lock:k", "holder", Some(Duration::from_millis(10)));

        // The holder's value lands just as the waiter checks the lock.
        let seeder = store.clone();
        store.fail_when(move |op| {
            if matches!(op, StoreOp::Get(key) if key == "lock:k") {
                seeder.seed("k", r#""winner""#, None);
            }
            false
        });
        let cache = Cache::builder(clock).memory().shared(store.clone()).build().unwrap();

        let value = block_on(cache.get_or_create("k", || async { Ok::<_, String>("loser".to_string()) }, EntryTtl::new()));

        assert_eq!(value.as_deref(), Ok("winner"));
        capture.assert_contains("cache.stampede_wait_hit");
        capture.assert_not_contains("cache.lock_vacated");
    }

    #[test]
    fn unencodable_value_is_not_stored() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let store = MockStore::new();
        let cache = cache_over(&store);
        let value: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);

        block_on(cache.set("k", &value, EntryTtl::new()));

        assert_eq!(store.count_ops(|op| matches!(op, StoreOp::Set { .. })), 0);
        assert_eq!(block_on(cache.local_tier().get("k")).unwrap(), None);
        capture.assert_contains("cache.encode_failed");
        capture.assert_contains("cache.set");
        capture.assert_not_contains("cache.local_error");
    }

    #[derive(Debug)]
    struct BrokenLocal;

    impl ByteTier for BrokenLocal {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>, Error> {
            Err(Error::unavailable("local tier broken"))
        }

        async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), Error> {
            Err(Error::unavailable("local tier broken"))
        }

        async fn delete(&self, _key: &str) -> Result<(), Error> {
            Err(Error::unavailable("local tier broken"))
        }
    }

    impl LocalTier for BrokenLocal {
        async fn invalidate_prefix(&self, _prefix: &str) -> Result<u64, Error> {
            Err(Error::unavailable("local tier broken"))
        }

        async fn clear(&self) -> Result<(), Error> {
            Err(Error::unavailable("local tier broken"))
        }
    }

    #[test]
    fn clear_local_failure_is_reported_as_clear_local() {
        let capture = LogCapture::new();
        let _guard = tracing::subscriber::set_default(capture.subscriber());

        let cache = Cache::builder(Clock::new_frozen())
            .local(BrokenLocal)
            .shared(MockStore::new())
            .build()
            .unwrap();

        block_on(cache.clear_local());

        capture.assert_contains("cache.clear_local");
        capture.assert_contains("cache.local_error");
        capture.assert_contains("local tier broken");
        capture.assert_not_contains("cache.remove");
    }

    #[test]
    fn broken_local_tier_still_serves_from_shared() {
        let store = MockStore::new();
        store.seed("k", "5", None);
        let cache = Cache::builder(Clock::new_frozen())
            .local(BrokenLocal)
            .shared(store)
            .build()
            .unwrap();

        assert_eq!(block_on(cache.get::<u32>("k")), Some(5));
    }
}
