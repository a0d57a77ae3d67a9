// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Byte-tier abstractions for the strata multi-tier cache.
//!
//! A strata cache stacks an in-process [`LocalTier`] on top of a cross-process
//! [`SharedStore`]. Both store opaque payloads ([`bytes::Bytes`]) with a
//! per-entry TTL; typing and serialization happen in the `strata` facade.
//!
//! # Implementing a Tier
//!
//! ```
//! use std::{collections::HashMap, sync::Mutex, time::Duration};
//!
//! use bytes::Bytes;
//! use strata_tier::{ByteTier, CacheEntry, Error, LocalTier, Tier};
//!
//! #[derive(Default)]
//! struct MapTier(Mutex<HashMap<String, Bytes>>);
//!
//! impl ByteTier for MapTier {
//!     async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
//!         let map = self.0.lock().unwrap();
//!         Ok(map.get(key).map(|value| CacheEntry::new(value.clone(), Tier::Local)))
//!     }
//!
//!     async fn set(&self, key: &str, value: Bytes, _ttl: Duration) -> Result<(), Error> {
//!         self.0.lock().unwrap().insert(key.to_owned(), value);
//!         Ok(())
//!     }
//!
//!     async fn delete(&self, key: &str) -> Result<(), Error> {
//!         self.0.lock().unwrap().remove(key);
//!         Ok(())
//!     }
//! }
//!
//! impl LocalTier for MapTier {
//!     async fn invalidate_prefix(&self, prefix: &str) -> Result<u64, Error> {
//!         let mut map = self.0.lock().unwrap();
//!         let before = map.len();
//!         map.retain(|key, _| !key.starts_with(prefix));
//!         Ok((before - map.len()) as u64)
//!     }
//!
//!     async fn clear(&self) -> Result<(), Error> {
//!         self.0.lock().unwrap().clear();
//!         Ok(())
//!     }
//! }
//! ```
//!
//! # Testing
//!
//! The `test-util` feature provides [`testing::MockStore`], an in-memory
//! [`SharedStore`] with lease-expiring locks and failure injection.

mod entry;
mod error;
mod glob;
#[cfg(any(feature = "test-util", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod testing;
mod tier;

pub use entry::{CacheEntry, ScanPage, Tier};
pub use error::{Error, ErrorKind, Result};
pub use glob::{escape_glob, glob_matches};
pub use tier::{ByteTier, LocalTier, SharedStore};
