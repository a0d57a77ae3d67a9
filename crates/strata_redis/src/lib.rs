// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Redis shared tier for strata caches.
//!
//! [`RedisStore`] implements [`strata_tier::SharedStore`] on top of a
//! [`redis::aio::ConnectionManager`]:
//! - entries are written with `SET ... PX`, so Redis expires them on its own;
//! - locks are `SET ... NX PX` and are released by an owner-checking script;
//! - prefix sweeps use `SCAN ... MATCH` and `DEL` on batches of keys.

mod store;

#[doc(inline)]
pub use store::RedisStore;
