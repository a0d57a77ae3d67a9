// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The traits every strata tier implements.
//!
//! [`ByteTier`] is the common keyed byte storage. [`LocalTier`] adds what an
//! in-process tier can do cheaply, and [`SharedStore`] adds the primitives the
//! cache needs from a cross-process store: cursor scans, batch deletes and
//! lease-bounded locks.

use std::time::Duration;

use bytes::Bytes;

use crate::{CacheEntry, Error, ScanPage};

/// Keyed byte storage with per-entry TTL.
///
/// Implementations are expected to be cheap to share across tasks; all methods
/// take `&self`.
pub trait ByteTier: Send + Sync {
    /// Looks up a key. Expired entries are reported as absent.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry>, Error>> + Send;

    /// Stores a payload that expires after `ttl`. Overwrites any existing entry.
    fn set(&self, key: &str, value: Bytes, ttl: Duration) -> impl Future<Output = Result<(), Error>> + Send;

    /// Deletes a key. Deleting an absent key succeeds.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send;
}

/// An in-process tier owned by a single cache instance.
pub trait LocalTier: ByteTier {
    /// Removes every entry whose key starts with `prefix` and returns how many were removed.
    fn invalidate_prefix(&self, prefix: &str) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Removes every entry.
    fn clear(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Returns the number of entries, if the tier tracks it.
    ///
    /// The count may lag behind recent writes.
    fn len(&self) -> Option<u64> {
        None
    }

    /// Returns `true` if the tier holds no entries, if the tier tracks its size.
    fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }
}

/// A cross-process store shared by every cache instance.
///
/// Beyond [`ByteTier`], a shared store must offer the following.
///
/// - A non-blocking cursor scan over keys matching a glob pattern (`*`, `?`,
///   `[...]` and backslash escapes).
/// - An atomic create-if-absent with a store-enforced lease, used as a mutex.
/// - A release that only deletes the lock if the caller still owns it.
pub trait SharedStore: ByteTier {
    /// Deletes several keys at once and returns how many existed.
    fn delete_many(&self, keys: &[String]) -> impl Future<Output = Result<u64, Error>> + Send;

    /// Returns one page of keys matching `pattern`, starting at `cursor`.
    ///
    /// `count` is a hint for the page size. Start with [`ScanPage::START`] and
    /// continue with [`ScanPage::next_cursor`] until [`ScanPage::is_last`].
    fn scan(&self, pattern: &str, cursor: u64, count: usize) -> impl Future<Output = Result<ScanPage, Error>> + Send;

    /// Atomically creates `resource` holding `owner` if it does not exist.
    ///
    /// The lock disappears on its own once `lease` elapses. Returns `true` if
    /// the caller now holds the lock.
    fn try_acquire(&self, resource: &str, owner: &str, lease: Duration) -> impl Future<Output = Result<bool, Error>> + Send;

    /// Deletes `resource` only if it still holds `owner`.
    ///
    /// Returns `false` when the lock expired or is held by someone else.
    fn release(&self, resource: &str, owner: &str) -> impl Future<Output = Result<bool, Error>> + Send;
}

impl<T: ByteTier> ByteTier for std::sync::Arc<T> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<CacheEntry>, Error>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Bytes, ttl: Duration) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), Error>> + Send {
        (**self).delete(key)
    }
}

impl<T: SharedStore> SharedStore for std::sync::Arc<T> {
    fn delete_many(&self, keys: &[String]) -> impl Future<Output = Result<u64, Error>> + Send {
        (**self).delete_many(keys)
    }

    fn scan(&self, pattern: &str, cursor: u64, count: usize) -> impl Future<Output = Result<ScanPage, Error>> + Send {
        (**self).scan(pattern, cursor, count)
    }

    fn try_acquire(&self, resource: &str, owner: &str, lease: Duration) -> impl Future<Output = Result<bool, Error>> + Send {
        (**self).try_acquire(resource, owner, lease)
    }

    fn release(&self, resource: &str, owner: &str) -> impl Future<Output = Result<bool, Error>> + Send {
        (**self).release(resource, owner)
    }
}
