// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use redis::{Client, RedisError, Script, aio::ConnectionManager};
use strata_tier::{ByteTier, CacheEntry, Error, ScanPage, SharedStore, Tier};
use tick::Clock;

const RELEASE_SCRIPT: &str = r#"if redis.call("get", KEYS[1]) == ARGV[1] then return redis.call("del", KEYS[1]) else return 0 end"#;

/// A [`SharedStore`] backed by a Redis server.
///
/// Clones share one multiplexed connection. Commands sent while the server is
/// unreachable fail with [`ErrorKind::Unavailable`](strata_tier::ErrorKind::Unavailable)
/// and the connection is re-established in the background.
///
/// # Examples
///
/// ```no_run
/// use strata_redis::RedisStore;
/// use strata_tier::ByteTier;
/// use tick::Clock;
///
/// # async fn demo() -> Result<(), strata_tier::Error> {
/// let store = RedisStore::connect("redis://127.0.0.1:6379", Clock::new_tokio()).await?;
/// store.delete("stale").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    release_script: Script,
    clock: Clock,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connects to the server at `url`, for example `redis://127.0.0.1:6379`.
    ///
    /// # Errors
    ///
    /// Returns a [`Config`](strata_tier::ErrorKind::Config) error for a
    /// malformed URL and an [`Unavailable`](strata_tier::ErrorKind::Unavailable)
    /// error if the first connection cannot be made.
    pub async fn connect(url: &str, clock: Clock) -> Result<Self, Error> {
        let client = Client::open(url).map_err(Error::config)?;
        let connection = client.get_connection_manager().await.map_err(map_error)?;
        Ok(Self::from_manager(connection, clock))
    }

    /// Wraps an existing connection manager.
    #[must_use]
    pub fn from_manager(connection: ConnectionManager, clock: Clock) -> Self {
        Self {
            connection,
            release_script: Script::new(RELEASE_SCRIPT),
            clock,
        }
    }

    fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

impl ByteTier for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let mut conn = self.connection();
        let (value, pttl): (Option<Vec<u8>>, i64) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(map_error)?;

        Ok(value.map(|value| {
            let entry = CacheEntry::new(Bytes::from(value), Tier::Shared);
            match expiry_from_pttl(self.clock.system_time(), pttl) {
                Some(at) => entry.with_expiry(at),
                None => entry,
            }
        }))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.connection();
        let () = redis::cmd("SET")
            .arg(key)
            .arg(value.as_ref())
            .arg("PX")
            .arg(px_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.connection();
        let _removed: u64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await.map_err(map_error)?;
        Ok(())
    }
}

impl SharedStore for RedisStore {
    async fn delete_many(&self, keys: &[String]) -> Result<u64, Error> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection();
        let removed: u64 = redis::cmd("DEL").arg(keys).query_async(&mut conn).await.map_err(map_error)?;
        Ok(removed)
    }

    async fn scan(&self, pattern: &str, cursor: u64, count: usize) -> Result<ScanPage, Error> {
        let mut conn = self.connection();
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count.max(1))
            .query_async(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(ScanPage::new(keys, next_cursor))
    }

    async fn try_acquire(&self, resource: &str, owner: &str, lease: Duration) -> Result<bool, Error> {
        let mut conn = self.connection();
        let reply: Option<String> = redis::cmd("SET")
            .arg(resource)
            .arg(owner)
            .arg("NX")
            .arg("PX")
            .arg(px_millis(lease))
            .query_async(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(reply.is_some())
    }

    async fn release(&self, resource: &str, owner: &str) -> Result<bool, Error> {
        let mut conn = self.connection();
        let removed: i64 = self
            .release_script
            .key(resource)
            .arg(owner)
            .invoke_async(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(removed == 1)
    }
}

/// Largest expiry Redis accepts for `PX`.
const MAX_PX_MILLIS: u64 = i64::MAX.unsigned_abs();

/// Redis rejects `PX 0` and values above `i64::MAX`, so TTLs are clamped to that range.
fn px_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).clamp(1, MAX_PX_MILLIS)
}

/// `PTTL` is -1 for keys without expiry and -2 for keys that are gone.
fn expiry_from_pttl(now: SystemTime, pttl: i64) -> Option<SystemTime> {
    let millis = u64::try_from(pttl).ok().filter(|millis| *millis > 0)?;
    now.checked_add(Duration::from_millis(millis))
}

fn map_error(error: RedisError) -> Error {
    if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal() || error.is_timeout() {
        Error::unavailable(error)
    } else {
        Error::protocol(error)
    }
}
