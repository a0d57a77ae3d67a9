// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory local tier using moka.

use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use moka::{Expiry, future::Cache};
use strata_tier::{ByteTier, CacheEntry, Error, LocalTier, Tier};
use thread_aware::{Arc, PerProcess, ThreadAware};

use crate::builder::MemoryTierBuilder;

#[derive(Clone, Debug)]
struct LocalRecord {
    value: Bytes,
    ttl: Duration,
    written_at: SystemTime,
}

impl LocalRecord {
    fn into_entry(self) -> CacheEntry {
        let entry = CacheEntry::new(self.value, Tier::Local);
        match self.written_at.checked_add(self.ttl) {
            Some(at) => entry.with_expiry(at),
            None => entry,
        }
    }
}

/// Expires each record after the TTL it was written with, capped by the tier's maximum.
#[derive(Clone, Copy, Debug)]
struct RecordExpiry {
    max_ttl: Option<Duration>,
}

impl RecordExpiry {
    fn ttl_for(self, record: &LocalRecord) -> Duration {
        self.max_ttl.map_or(record.ttl, |max| record.ttl.min(max))
    }
}

impl Expiry<String, LocalRecord> for RecordExpiry {
    fn expire_after_create(&self, _key: &String, value: &LocalRecord, _created_at: Instant) -> Option<Duration> {
        Some(self.ttl_for(value))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &LocalRecord,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(self.ttl_for(value))
    }
}

/// An in-process local tier backed by moka.
///
/// Entries are evicted when the capacity is reached (`TinyLFU`) or when their
/// own TTL elapses. Clones share the same underlying cache.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata_memory::MemoryTier;
/// use strata_tier::ByteTier;
/// # futures::executor::block_on(async {
///
/// let tier = MemoryTier::with_capacity(1000);
/// tier.set("key", "42".into(), Duration::from_secs(60)).await.unwrap();
/// let entry = tier.get("key").await.unwrap();
/// assert_eq!(entry.unwrap().value().as_ref(), b"42");
/// # });
/// ```
#[derive(Debug, Clone, ThreadAware)]
pub struct MemoryTier {
    inner: Arc<Cache<String, LocalRecord>, PerProcess>,
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTier {
    /// Creates an unbounded local tier.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a local tier holding at most `max_capacity` entries.
    #[must_use]
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::builder().max_capacity(max_capacity).build()
    }

    /// Creates a builder for configuring a local tier.
    #[must_use]
    pub fn builder() -> MemoryTierBuilder {
        MemoryTierBuilder::new()
    }

    pub(crate) fn from_builder(builder: &MemoryTierBuilder) -> Self {
        let mut moka_builder = Cache::builder().expire_after(RecordExpiry {
            max_ttl: builder.max_ttl,
        });

        if let Some(capacity) = builder.max_capacity {
            moka_builder = moka_builder.max_capacity(capacity);
        }

        if let Some(capacity) = builder.initial_capacity {
            moka_builder = moka_builder.initial_capacity(capacity);
        }

        if let Some(name) = builder.name.as_deref() {
            moka_builder = moka_builder.name(name);
        }

        Self {
            inner: Arc::from_unaware(moka_builder.build()),
        }
    }

    /// Runs moka's pending maintenance so that [`LocalTier::len`] reflects recent writes.
    pub async fn sync(&self) {
        self.inner.run_pending_tasks().await;
    }
}

impl ByteTier for MemoryTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        Ok(self.inner.get(key).await.map(LocalRecord::into_entry))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), Error> {
        let record = LocalRecord {
            value,
            ttl,
            written_at: SystemTime::now(),
        };
        self.inner.insert(key.to_owned(), record).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.inner.invalidate(key).await;
        Ok(())
    }
}

impl LocalTier for MemoryTier {
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let matching: Vec<_> = self
            .inner
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0_u64;
        for key in matching {
            if self.inner.remove(key.as_str()).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear(&self) -> Result<(), Error> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }

    fn len(&self) -> Option<u64> {
        Some(self.inner.entry_count())
    }
}
