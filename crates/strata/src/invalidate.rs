// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bulk removal of shared-tier keys by prefix.
//!
//! The shared store is walked with its cursor scan rather than a blocking
//! "list all keys" call, and matches are deleted in bounded batches as each
//! page arrives. Keys written while the sweep runs may or may not be removed.

use strata_tier::{Error, ScanPage, SharedStore, escape_glob};

/// How many entries a prefix removal took out of each tier.
///
/// Counts are advisory: concurrent writers and expiries can make them drift
/// from what was actually present.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrefixRemoval {
    /// Entries removed from the local tier.
    pub local: u64,
    /// Entries removed from the shared tier.
    pub shared: u64,
    /// `false` if the shared sweep stopped early after a store failure.
    pub complete: bool,
}

impl PrefixRemoval {
    /// Total entries removed across both tiers.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.local.saturating_add(self.shared)
    }
}

/// Returns the scan pattern matching every key that starts with `prefix`.
#[must_use]
pub fn prefix_pattern(prefix: &str) -> String {
    let mut pattern = escape_glob(prefix);
    pattern.push('*');
    pattern
}

/// Outcome of one shared-tier sweep.
#[derive(Debug)]
pub(crate) struct Sweep {
    pub removed: u64,
    pub failure: Option<Error>,
}

/// Scans the shared store for `pattern` and deletes every match.
///
/// Each page's keys are deleted in batches of at most `batch_size` before the
/// next page is requested. The first failing scan or delete stops the sweep;
/// what was removed until then is still reported.
pub(crate) async fn sweep<S: SharedStore>(store: &S, pattern: &str, page_size: usize, batch_size: usize) -> Sweep {
    let mut removed = 0_u64;
    let mut cursor = ScanPage::START;

    loop {
        let page = match store.scan(pattern, cursor, page_size).await {
            Ok(page) => page,
            Err(error) => {
                return Sweep {
                    removed,
                    failure: Some(error),
                };
            }
        };
        cursor = page.next_cursor();
        let last = page.is_last();

        let mut keys = page.into_keys();
        keys.sort_unstable();
        keys.dedup();

        for batch in keys.chunks(batch_size.max(1)) {
            match store.delete_many(batch).await {
                Ok(count) => removed = removed.saturating_add(count),
                Err(error) => {
                    return Sweep {
                        removed,
                        failure: Some(error),
                    };
                }
            }
        }

        if last {
            return Sweep { removed, failure: None };
        }
    }
}
