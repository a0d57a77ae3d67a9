// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Resilient two-tier caching for services that share an expensive backend.
//!
//! A [`Cache`] layers a fast in-process tier (L1) over a shared store (L2)
//! such as Redis:
//! - Reads check L1 first and refill it from L2 hits.
//! - [`Cache::get_or_create`] takes a distributed lock on a miss, so one
//!   caller computes a value while the others wait for it.
//! - Shared-tier TTLs get a random offset ([`TtlJitter`]) so that values
//!   written together do not expire together.
//! - [`Cache::remove_by_prefix`] sweeps both tiers, walking the shared store
//!   with a cursor scan.
//! - An unreachable shared store degrades the cache to L1 plus direct
//!   computation instead of failing requests.
//!
//! Every operation emits `tracing` events named `cache.event`.
//!
//! # Examples
//!
//! ```
//! use std::convert::Infallible;
//!
//! use strata::{Cache, CacheOptions, EntryTtl, TtlCategory};
//! use strata_tier::testing::MockStore;
//! use tick::Clock;
//! # futures::executor::block_on(async {
//!
//! let store = MockStore::new();
//! let mut options = CacheOptions::default();
//! options.namespace = "AgentApi:".to_string();
//!
//! let cache = Cache::builder(Clock::new_frozen())
//!     .options(options.clone())
//!     .memory()
//!     .shared(store.clone())
//!     .build()
//!     .unwrap();
//!
//! let ttl = EntryTtl::category(&options, TtlCategory::Embedding);
//! let embedding: Vec<f32> = cache
//!     .get_or_create("emb:hello", || async { Ok::<_, Infallible>(vec![0.1, 0.2]) }, ttl)
//!     .await
//!     .unwrap();
//! assert_eq!(embedding, vec![0.1, 0.2]);
//! assert!(store.contains_key("AgentApi:emb:hello"));
//!
//! let removed = cache.remove_by_prefix("emb:").await;
//! assert_eq!(removed.shared, 1);
//! assert!(removed.complete);
//! # });
//! ```

pub mod builder;
pub mod cache;
mod codec;
pub mod invalidate;
pub mod jitter;
pub mod lock;
pub mod options;
mod telemetry;

#[doc(inline)]
pub use builder::CacheBuilder;
#[doc(inline)]
pub use cache::{Cache, CacheName};
#[doc(inline)]
pub use invalidate::PrefixRemoval;
#[doc(inline)]
pub use jitter::TtlJitter;
#[doc(inline)]
pub use options::{CacheOptions, EntryTtl, TtlCategory};
#[doc(inline)]
pub use strata_tier::{Error, ErrorKind, Tier};
