// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Builder for configuring local tiers.

use std::time::Duration;

use crate::tier::MemoryTier;

/// Builder for configuring a [`MemoryTier`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata_memory::MemoryTier;
///
/// let tier = MemoryTier::builder()
///     .max_capacity(10_000)
///     .max_ttl(Duration::from_secs(3600))
///     .name("l1")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct MemoryTierBuilder {
    pub(crate) max_capacity: Option<u64>,
    pub(crate) initial_capacity: Option<usize>,
    pub(crate) max_ttl: Option<Duration>,
    pub(crate) name: Option<String>,
}

impl MemoryTierBuilder {
    /// Creates a builder for an unbounded tier with no TTL cap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of entries.
    #[must_use]
    pub fn max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = Some(capacity);
        self
    }

    /// Pre-allocates room for `capacity` entries.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = Some(capacity);
        self
    }

    /// Caps the TTL of every entry, whatever TTL it is written with.
    #[must_use]
    pub fn max_ttl(mut self, ttl: Duration) -> Self {
        self.max_ttl = Some(ttl);
        self
    }

    /// Names the underlying moka cache.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Builds the tier.
    #[must_use]
    pub fn build(self) -> MemoryTier {
        MemoryTier::from_builder(&self)
    }
}
