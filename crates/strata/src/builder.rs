// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for [`Cache`].

use strata_memory::MemoryTier;
use strata_tier::{Error, LocalTier, SharedStore};
use tick::Clock;

use crate::{
    cache::{Cache, CacheName, DEFAULT_NAME},
    options::CacheOptions,
};

/// Builder for a [`Cache`].
///
/// Created by [`Cache::builder`]. A cache needs both a local tier and a
/// shared store before it can be built.
///
/// # Examples
///
/// ```
/// use strata::Cache;
/// use strata_memory::MemoryTier;
/// use strata_tier::testing::MockStore;
/// use tick::Clock;
///
/// let cache = Cache::builder(Clock::new_frozen())
///     .local(MemoryTier::with_capacity(100))
///     .shared(MockStore::new())
///     .build()
///     .unwrap();
/// assert_eq!(cache.name(), "strata");
/// ```
#[derive(Debug)]
pub struct CacheBuilder<L = (), S = ()> {
    name: Option<CacheName>,
    clock: Clock,
    options: CacheOptions,
    local: L,
    shared: S,
}

impl CacheBuilder {
    pub(crate) fn new(clock: Clock) -> Self {
        Self {
            name: None,
            clock,
            options: CacheOptions::default(),
            local: (),
            shared: (),
        }
    }
}

impl<L, S> CacheBuilder<L, S> {
    /// Sets the name reported in every cache event.
    #[must_use]
    pub fn name(mut self, name: CacheName) -> Self {
        self.name = Some(name);
        self
    }

    /// Replaces the options. Defaults to [`CacheOptions::default`].
    #[must_use]
    pub fn options(mut self, options: CacheOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses `tier` as the local tier.
    #[must_use]
    pub fn local<L2: LocalTier>(self, tier: L2) -> CacheBuilder<L2, S> {
        CacheBuilder {
            name: self.name,
            clock: self.clock,
            options: self.options,
            local: tier,
            shared: self.shared,
        }
    }

    /// Uses an in-memory local tier sized by [`CacheOptions::local_capacity`].
    ///
    /// The capacity is read when this is called, so set the options first.
    #[must_use]
    pub fn memory(self) -> CacheBuilder<MemoryTier, S> {
        let tier = MemoryTier::builder()
            .max_capacity(self.options.local_capacity)
            .name(self.name.unwrap_or(DEFAULT_NAME))
            .build();
        self.local(tier)
    }

    /// Uses `store` as the shared tier and lock backend.
    #[must_use]
    pub fn shared<S2: SharedStore + 'static>(self, store: S2) -> CacheBuilder<L, S2> {
        CacheBuilder {
            name: self.name,
            clock: self.clock,
            options: self.options,
            local: self.local,
            shared: store,
        }
    }
}

impl<L, S> CacheBuilder<L, S>
where
    L: LocalTier,
    S: SharedStore + 'static,
{
    /// Builds the cache.
    ///
    /// # Errors
    ///
    /// Returns a [`Config`](strata_tier::ErrorKind::Config) error if the
    /// options are invalid.
    pub fn build(self) -> Result<Cache<L, S>, Error> {
        self.options.validate()?;
        Ok(Cache::new(
            self.name.unwrap_or(DEFAULT_NAME),
            self.clock,
            self.options,
            self.local,
            self.shared,
        ))
    }
}
