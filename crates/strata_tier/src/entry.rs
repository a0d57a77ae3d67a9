// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::{fmt, time::SystemTime};

use bytes::Bytes;

/// Identifies which tier produced an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tier {
    /// The in-process tier (L1).
    Local,
    /// The cross-process shared store (L2).
    Shared,
}

impl Tier {
    /// Returns a short, stable label for this tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Shared => "shared",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A serialized payload read back from a tier.
///
/// Entries are read-only once written. The key is the lookup argument and is
/// not repeated here.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use strata_tier::{CacheEntry, Tier};
///
/// let entry = CacheEntry::new(Bytes::from_static(b"{}"), Tier::Shared);
/// assert_eq!(entry.origin(), Tier::Shared);
/// assert!(entry.expires_at().is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry {
    value: Bytes,
    origin: Tier,
    expires_at: Option<SystemTime>,
}

impl CacheEntry {
    /// Creates an entry without a known expiry.
    #[must_use]
    pub const fn new(value: Bytes, origin: Tier) -> Self {
        Self {
            value,
            origin,
            expires_at: None,
        }
    }

    /// Sets the absolute expiry reported by the tier.
    #[must_use]
    pub const fn with_expiry(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns the serialized payload.
    #[must_use]
    pub const fn value(&self) -> &Bytes {
        &self.value
    }

    /// Consumes the entry and returns the payload.
    #[must_use]
    pub fn into_value(self) -> Bytes {
        self.value
    }

    /// Returns the tier the entry was read from.
    #[must_use]
    pub const fn origin(&self) -> Tier {
        self.origin
    }

    /// Returns the absolute expiry, if the tier knows it.
    #[must_use]
    pub const fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }
}

/// One page of a cursor scan.
///
/// A `next_cursor` of [`ScanPage::START`] means the scan is complete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanPage {
    keys: Vec<String>,
    next_cursor: u64,
}

impl ScanPage {
    /// The cursor that starts a scan and also marks its completion.
    pub const START: u64 = 0;

    /// Creates a page.
    #[must_use]
    pub const fn new(keys: Vec<String>, next_cursor: u64) -> Self {
        Self { keys, next_cursor }
    }

    /// Keys matched on this page. May contain keys already seen on earlier pages.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Consumes the page and returns its keys.
    #[must_use]
    pub fn into_keys(self) -> Vec<String> {
        self.keys
    }

    /// The cursor to pass to the next `scan` call.
    #[must_use]
    pub const fn next_cursor(&self) -> u64 {
        self.next_cursor
    }

    /// Returns `true` if this is the last page.
    #[must_use]
    pub const fn is_last(&self) -> bool {
        self.next_cursor == Self::START
    }
}
