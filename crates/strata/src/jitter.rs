// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Randomized TTL extension for shared-tier writes.

use std::{fmt::Debug, time::Duration};

/// Non-cryptographic source of jitter samples.
#[derive(Clone, Default)]
pub(crate) enum Rnd {
    #[default]
    Real,

    #[cfg(test)]
    Test(std::sync::Arc<dyn Fn(u64, u64) -> u64 + Send + Sync>),
}

impl Debug for Rnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            #[cfg(test)]
            Self::Test(_) => write!(f, "Test"),
        }
    }
}

impl Rnd {
    #[cfg(test)]
    pub fn new_function<F>(f: F) -> Self
    where
        F: Fn(u64, u64) -> u64 + Send + Sync + 'static,
    {
        Self::Test(std::sync::Arc::new(f))
    }

    /// Returns a value in `low..=high`.
    pub fn next_u64_inclusive(&self, low: u64, high: u64) -> u64 {
        match self {
            Self::Real => fastrand::u64(low..=high),
            #[cfg(test)]
            Self::Test(generator) => generator(low, high).clamp(low, high),
        }
    }
}

/// Adds a uniformly random offset to shared-tier TTLs.
///
/// Keys written together would otherwise expire together. The offset is drawn
/// from `[min, max]` at millisecond resolution, so with `min == max` it is
/// constant.
#[derive(Clone, Debug)]
pub struct TtlJitter {
    min_ms: u64,
    max_ms: u64,
    rnd: Rnd,
}

impl TtlJitter {
    /// Creates a jitter policy drawing offsets from `[min, max]`.
    ///
    /// Bounds given in the wrong order are swapped.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let (min_ms, max_ms) = (millis(min), millis(max));
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms: min_ms.max(max_ms),
            rnd: Rnd::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_rnd(mut self, rnd: Rnd) -> Self {
        self.rnd = rnd;
        self
    }

    /// Draws one offset.
    #[must_use]
    pub fn offset(&self) -> Duration {
        Duration::from_millis(self.rnd.next_u64_inclusive(self.min_ms, self.max_ms))
    }

    /// Returns `nominal` extended by a freshly drawn offset.
    #[must_use]
    pub fn apply(&self, nominal: Duration) -> Duration {
        nominal.saturating_add(self.offset())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
