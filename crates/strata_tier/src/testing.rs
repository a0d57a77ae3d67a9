// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! In-memory shared store for testing.
//!
//! [`MockStore`] behaves like a single shared-store node: entries and locks
//! expire against a [`tick::Clock`], scans are paginated with resumable
//! cursors, every operation is recorded, and any operation can be made to fail.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::{Duration, SystemTime},
};

use bytes::Bytes;
use parking_lot::Mutex;
use tick::Clock;

use crate::{ByteTier, CacheEntry, Error, ScanPage, SharedStore, Tier, glob_matches};

/// Recorded store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// A get was performed for the key.
    Get(String),
    /// A set was performed.
    Set {
        /// The key written.
        key: String,
        /// The TTL requested by the caller.
        ttl: Duration,
    },
    /// A delete was performed for the key.
    Delete(String),
    /// A batch delete was performed for the keys.
    DeleteMany(Vec<String>),
    /// A scan page was requested.
    Scan {
        /// The match pattern.
        pattern: String,
        /// The cursor passed in.
        cursor: u64,
    },
    /// A lock acquisition was attempted.
    TryAcquire {
        /// The lock resource.
        resource: String,
        /// The owner token offered.
        owner: String,
    },
    /// A lock release was attempted.
    Release {
        /// The lock resource.
        resource: String,
        /// The owner token offered.
        owner: String,
    },
}

type FailPredicate = Box<dyn Fn(&StoreOp) -> bool + Send + Sync>;

#[derive(Debug, Clone)]
struct Record {
    value: Bytes,
    expires_at: Option<SystemTime>,
}

impl Record {
    fn is_live(&self, now: SystemTime) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct State {
    data: BTreeMap<String, Record>,
    // Scan cursors resume after the last key they returned, so keys deleted
    // between pages never cause live keys to be skipped.
    cursors: HashMap<u64, String>,
    next_cursor: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct ScanSettings {
    page_size: Option<usize>,
    repeat_last_key: bool,
}

/// A configurable in-memory shared store for testing.
///
/// Clones share the same state, so a test can hand one clone to a cache and
/// keep another to inspect and steer it.
pub struct MockStore {
    state: Arc<Mutex<State>>,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    fail_when: Arc<Mutex<Option<FailPredicate>>>,
    clock: Clock,
    scan: ScanSettings,
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore")
            .field("state", &self.state)
            .field("operations", &self.operations)
            .field("fail_when", &self.fail_when.lock().is_some())
            .field("scan", &self.scan)
            .finish_non_exhaustive()
    }
}

impl Clone for MockStore {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            operations: Arc::clone(&self.operations),
            fail_when: Arc::clone(&self.fail_when),
            clock: self.clock.clone(),
            scan: self.scan,
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// Creates an empty store whose clock is frozen.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Clock::new_frozen())
    }

    /// Creates an empty store that expires entries and locks against `clock`.
    #[must_use]
    pub fn with_clock(clock: Clock) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            operations: Arc::new(Mutex::new(Vec::new())),
            fail_when: Arc::new(Mutex::new(None)),
            clock,
            scan: ScanSettings::default(),
        }
    }

    /// Forces every scan page to cover at most `page_size` keys, whatever count the caller hints.
    #[must_use]
    pub fn with_scan_page_size(mut self, page_size: usize) -> Self {
        self.scan.page_size = Some(page_size.max(1));
        self
    }

    /// Makes every scan page after the first repeat the last key of the previous page.
    ///
    /// Real stores may report a key more than once during a scan.
    #[must_use]
    pub fn with_repeated_scan_keys(mut self) -> Self {
        self.scan.repeat_last_key = true;
        self
    }

    /// Stores a payload without recording an operation.
    pub fn seed(&self, key: impl Into<String>, value: impl Into<Bytes>, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| self.clock.system_time() + ttl);
        self.state.lock().data.insert(
            key.into(),
            Record {
                value: value.into(),
                expires_at,
            },
        );
    }

    /// Returns the live payload stored under `key`, without recording an operation.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        let now = self.clock.system_time();
        self.state
            .lock()
            .data
            .get(key)
            .filter(|record| record.is_live(now))
            .map(|record| record.value.clone())
    }

    /// Returns `true` if a live entry or lock exists under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.raw(key).is_some()
    }

    /// Returns the remaining time to live of `key`, if it is live and expiring.
    #[must_use]
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.system_time();
        let state = self.state.lock();
        let record = state.data.get(key).filter(|record| record.is_live(now))?;
        record.expires_at?.duration_since(now).ok()
    }

    /// Returns the number of live entries and locks.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        let now = self.clock.system_time();
        self.state.lock().data.values().filter(|record| record.is_live(now)).count()
    }

    /// Sets a predicate that determines when operations should fail.
    ///
    /// Failing operations are still recorded and fail with an
    /// [`ErrorKind::Unavailable`](crate::ErrorKind::Unavailable) error.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&StoreOp) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock() = Some(Box::new(predicate));
    }

    /// Clears the failure predicate, allowing all operations to succeed.
    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Returns a clone of all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().clone()
    }

    /// Counts recorded operations matching `predicate`.
    #[must_use]
    pub fn count_ops(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.operations.lock().iter().filter(|op| predicate(op)).count()
    }

    /// Clears all recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().clear();
    }

    fn check(&self, op: StoreOp, message: &'static str) -> Result<(), Error> {
        let fail = self.fail_when.lock().as_ref().is_some_and(|predicate| predicate(&op));
        self.operations.lock().push(op);
        if fail { Err(Error::unavailable(message)) } else { Ok(()) }
    }

    fn live_record(&self, state: &State, key: &str) -> Option<Record> {
        let now = self.clock.system_time();
        state.data.get(key).filter(|record| record.is_live(now)).cloned()
    }
}

impl ByteTier for MockStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.check(StoreOp::Get(key.to_owned()), "mock: get failed")?;
        let state = self.state.lock();
        Ok(self.live_record(&state, key).map(|record| {
            let entry = CacheEntry::new(record.value, Tier::Shared);
            match record.expires_at {
                Some(at) => entry.with_expiry(at),
                None => entry,
            }
        }))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), Error> {
        self.check(StoreOp::Set { key: key.to_owned(), ttl }, "mock: set failed")?;
        let expires_at = Some(self.clock.system_time() + ttl);
        self.state.lock().data.insert(key.to_owned(), Record { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.check(StoreOp::Delete(key.to_owned()), "mock: delete failed")?;
        self.state.lock().data.remove(key);
        Ok(())
    }
}

impl SharedStore for MockStore {
    async fn delete_many(&self, keys: &[String]) -> Result<u64, Error> {
        self.check(StoreOp::DeleteMany(keys.to_vec()), "mock: delete_many failed")?;
        let now = self.clock.system_time();
        let mut state = self.state.lock();
        let mut removed = 0;
        for key in keys {
            if state.data.remove(key).is_some_and(|record| record.is_live(now)) {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<ScanPage, Error> {
        self.check(
            StoreOp::Scan {
                pattern: pattern.to_owned(),
                cursor,
            },
            "mock: scan failed",
        )?;

        let now = self.clock.system_time();
        let page_size = self.scan.page_size.unwrap_or(count).max(1);
        let mut state = self.state.lock();

        let resume_after = if cursor == ScanPage::START {
            None
        } else {
            match state.cursors.remove(&cursor) {
                Some(key) => Some(key),
                None => return Err(Error::protocol(format!("mock: unknown scan cursor {cursor}"))),
            }
        };

        let mut visited: Vec<&String> = match &resume_after {
            Some(after) => state
                .data
                .range::<String, _>((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .filter(|(_, record)| record.is_live(now))
                .map(|(key, _)| key)
                .take(page_size + 1)
                .collect(),
            None => state
                .data
                .iter()
                .filter(|(_, record)| record.is_live(now))
                .map(|(key, _)| key)
                .take(page_size + 1)
                .collect(),
        };

        let has_more = visited.len() > page_size;
        visited.truncate(page_size);

        let mut keys: Vec<String> = visited
            .iter()
            .filter(|key| glob_matches(pattern, key))
            .map(|key| (*key).clone())
            .collect();

        if self.scan.repeat_last_key
            && let Some(previous) = resume_after.as_ref().filter(|key| glob_matches(pattern, key))
        {
            keys.insert(0, previous.clone());
        }

        let last_visited = visited.last().map(|key| (*key).clone());
        let next_cursor = match last_visited {
            Some(last) if has_more => {
                state.next_cursor += 1;
                let id = state.next_cursor;
                state.cursors.insert(id, last);
                id
            }
            _ => ScanPage::START,
        };

        Ok(ScanPage::new(keys, next_cursor))
    }

    async fn try_acquire(&self, resource: &str, owner: &str, lease: Duration) -> Result<bool, Error> {
        self.check(
            StoreOp::TryAcquire {
                resource: resource.to_owned(),
                owner: owner.to_owned(),
            },
            "mock: try_acquire failed",
        )?;
        let mut state = self.state.lock();
        if self.live_record(&state, resource).is_some() {
            return Ok(false);
        }
        let record = Record {
            value: Bytes::copy_from_slice(owner.as_bytes()),
            expires_at: Some(self.clock.system_time() + lease),
        };
        state.data.insert(resource.to_owned(), record);
        Ok(true)
    }

    async fn release(&self, resource: &str, owner: &str) -> Result<bool, Error> {
        self.check(
            StoreOp::Release {
                resource: resource.to_owned(),
                owner: owner.to_owned(),
            },
            "mock: release failed",
        )?;
        let mut state = self.state.lock();
        let owned = self
            .live_record(&state, resource)
            .is_some_and(|record| record.value.as_ref() == owner.as_bytes());
        if owned {
            state.data.remove(resource);
        }
        Ok(owned)
    }
}
