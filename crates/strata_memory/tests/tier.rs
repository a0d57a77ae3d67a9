// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `MemoryTier`.

use std::time::Duration;

use bytes::Bytes;
use strata_memory::{MemoryTier, MemoryTierBuilder};
use strata_tier::{ByteTier, LocalTier, Tier};

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

const MINUTE: Duration = Duration::from_secs(60);

#[test]
fn new_tier_is_empty() {
    let tier = MemoryTier::new();
    assert_eq!(tier.len(), Some(0));
    assert_eq!(tier.is_empty(), Some(true));
}

#[test]
fn get_returns_none_for_missing_key() {
    block_on(async {
        let tier = MemoryTier::with_capacity(10);
        assert!(tier.get("missing").await.expect("get failed").is_none());
    });
}

#[test]
fn set_and_get_round_trip_with_local_origin() {
    block_on(async {
        let tier = MemoryTier::new();
        tier.set("key", Bytes::from_static(b"payload"), MINUTE)
            .await
            .expect("set failed");

        let entry = tier.get("key").await.expect("get failed").expect("entry should exist");
        assert_eq!(entry.value(), &Bytes::from_static(b"payload"));
        assert_eq!(entry.origin(), Tier::Local);
        assert!(entry.expires_at().is_some());
    });
}

#[test]
fn set_overwrites_existing_value() {
    block_on(async {
        let tier = MemoryTier::new();
        tier.set("key", Bytes::from_static(b"1"), MINUTE).await.expect("set failed");
        tier.set("key", Bytes::from_static(b"2"), MINUTE).await.expect("set failed");

        let entry = tier.get("key").await.expect("get failed").expect("entry should exist");
        assert_eq!(entry.value(), &Bytes::from_static(b"2"));
    });
}

#[test]
fn delete_is_idempotent() {
    block_on(async {
        let tier = MemoryTier::new();
        tier.set("key", Bytes::from_static(b"1"), MINUTE).await.expect("set failed");
        tier.delete("key").await.expect("delete failed");
        tier.delete("key").await.expect("delete failed");
        assert!(tier.get("key").await.expect("get failed").is_none());
    });
}

#[test]
fn invalidate_prefix_removes_only_matching_entries() {
    block_on(async {
        let tier = MemoryTier::new();
        for key in ["rag:1", "rag:2", "embedding:1", "ra"] {
            tier.set(key, Bytes::from_static(b"x"), MINUTE).await.expect("set failed");
        }

        let removed = tier.invalidate_prefix("rag:").await.expect("invalidate failed");
        assert_eq!(removed, 2);
        assert!(tier.get("rag:1").await.expect("get failed").is_none());
        assert!(tier.get("embedding:1").await.expect("get failed").is_some());
        assert!(tier.get("ra").await.expect("get failed").is_some());
    });
}

#[test]
fn clear_removes_everything() {
    block_on(async {
        let tier = MemoryTier::new();
        tier.set("a", Bytes::from_static(b"x"), MINUTE).await.expect("set failed");
        tier.set("b", Bytes::from_static(b"x"), MINUTE).await.expect("set failed");
        tier.sync().await;
        assert_eq!(tier.len(), Some(2));

        tier.clear().await.expect("clear failed");
        assert!(tier.get("a").await.expect("get failed").is_none());
        assert_eq!(tier.len(), Some(0));
    });
}

#[test]
fn clones_share_entries() {
    block_on(async {
        let tier = MemoryTierBuilder::new().name("shared").build();
        let clone = tier.clone();
        tier.set("key", Bytes::from_static(b"x"), MINUTE).await.expect("set failed");
        assert!(clone.get("key").await.expect("get failed").is_some());
    });
}

#[tokio::test]
async fn entries_expire_after_their_own_ttl() {
    let tier = MemoryTier::new();
    tier.set("short", Bytes::from_static(b"x"), Duration::from_millis(50))
        .await
        .expect("set failed");
    tier.set("long", Bytes::from_static(b"x"), MINUTE).await.expect("set failed");

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(tier.get("short").await.expect("get failed").is_none());
    assert!(tier.get("long").await.expect("get failed").is_some());
}

#[tokio::test]
async fn max_ttl_caps_entry_ttl() {
    let tier = MemoryTier::builder().max_ttl(Duration::from_millis(50)).build();
    tier.set("key", Bytes::from_static(b"x"), MINUTE).await.expect("set failed");

    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(tier.get("key").await.expect("get failed").is_none());
}
