// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! In-process local tier for strata caches, backed by moka.
//!
//! [`MemoryTier`] implements [`strata_tier::LocalTier`]: a concurrent,
//! capacity-bounded store of byte payloads in which every entry expires after
//! the TTL it was written with. Use [`MemoryTierBuilder`] to configure it
//! without exposing moka types.
//!
//! ```
//! use std::time::Duration;
//!
//! use strata_memory::MemoryTierBuilder;
//! use strata_tier::{ByteTier, LocalTier};
//!
//! # futures::executor::block_on(async {
//! let tier = MemoryTierBuilder::new().max_capacity(1000).build();
//!
//! tier.set("rag:1", "a".into(), Duration::from_secs(300)).await.unwrap();
//! tier.set("rag:2", "b".into(), Duration::from_secs(300)).await.unwrap();
//! assert_eq!(tier.invalidate_prefix("rag:").await.unwrap(), 2);
//! # });
//! ```

pub mod builder;
pub mod tier;

#[doc(inline)]
pub use builder::MemoryTierBuilder;
#[doc(inline)]
pub use tier::MemoryTier;
