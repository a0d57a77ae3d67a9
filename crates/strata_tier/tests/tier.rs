// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `LocalTier` default implementations.

use std::{collections::HashMap, sync::Mutex, time::Duration};

use bytes::Bytes;
use futures::executor::block_on;
use strata_tier::{ByteTier, CacheEntry, Error, LocalTier, Tier};

/// Minimal tier that only provides required methods.
#[derive(Default)]
struct MinimalTier {
    data: Mutex<HashMap<String, Bytes>>,
}

impl ByteTier for MinimalTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let data = self.data.lock().expect("lock poisoned");
        Ok(data.get(key).map(|value| CacheEntry::new(value.clone(), Tier::Local)))
    }

    async fn set(&self, key: &str, value: Bytes, _ttl: Duration) -> Result<(), Error> {
        self.data.lock().expect("lock poisoned").insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.data.lock().expect("lock poisoned").remove(key);
        Ok(())
    }
}

impl LocalTier for MinimalTier {
    async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, Error> {
        let mut data = self.data.lock().expect("lock poisoned");
        let before = data.len();
        data.retain(|key, _| !key.starts_with(prefix));
        Ok(u64::try_from(before - data.len()).expect("count fits"))
    }

    async fn clear(&self) -> Result<(), Error> {
        self.data.lock().expect("lock poisoned").clear();
        Ok(())
    }
}

#[test]
fn default_len_is_none() {
    let tier = MinimalTier::default();
    assert_eq!(tier.len(), None);
    assert_eq!(tier.is_empty(), None);
}

#[test]
fn arc_forwards_byte_tier() {
    block_on(async {
        let tier = std::sync::Arc::new(MinimalTier::default());
        tier.set("k", Bytes::from_static(b"v"), Duration::from_secs(1))
            .await
            .expect("set failed");
        let entry = ByteTier::get(&tier, "k").await.expect("get failed");
        assert_eq!(entry.map(CacheEntry::into_value), Some(Bytes::from_static(b"v")));
    });
}

#[test]
fn invalidate_prefix_removes_only_matching_keys() {
    block_on(async {
        let tier = MinimalTier::default();
        for key in ["rag:1", "rag:2", "emb:1"] {
            tier.set(key, Bytes::from_static(b"x"), Duration::from_secs(1))
                .await
                .expect("set failed");
        }

        assert_eq!(tier.invalidate_prefix("rag:").await.expect("invalidate failed"), 2);
        assert!(tier.get("emb:1").await.expect("get failed").is_some());
    });
}
