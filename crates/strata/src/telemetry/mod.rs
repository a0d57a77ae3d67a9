// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Structured cache events.
//!
//! Every facade operation reports what happened through `tracing` events named
//! `cache.event`, tagged with the cache name, operation, activity, tier and key.

use strata_tier::{Error, Tier};

use crate::cache::CacheName;

#[cfg(test)]
pub(crate) mod testing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOperation {
    Get,
    GetOrCreate,
    Set,
    Remove,
    RemoveByPrefix,
    ClearLocal,
}

impl CacheOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "cache.get",
            Self::GetOrCreate => "cache.get_or_create",
            Self::Set => "cache.set",
            Self::Remove => "cache.remove",
            Self::RemoveByPrefix => "cache.remove_by_prefix",
            Self::ClearLocal => "cache.clear_local",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheActivity {
    HitLocal,
    HitShared,
    Miss,
    Corrupt,
    EncodeFailed,
    LockAcquired,
    LockContended,
    LockVacated,
    StampedeWaitHit,
    WaitTimeout,
    Fallback,
    LockReleased,
    LockLost,
    SharedError,
    LocalError,
    Inserted,
    Invalidated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl CacheActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HitLocal => "cache.hit_local",
            Self::HitShared => "cache.hit_shared",
            Self::Miss => "cache.miss",
            Self::Corrupt => "cache.corrupt",
            Self::EncodeFailed => "cache.encode_failed",
            Self::LockAcquired => "cache.lock_acquired",
            Self::LockContended => "cache.lock_contended",
            Self::LockVacated => "cache.lock_vacated",
            Self::StampedeWaitHit => "cache.stampede_wait_hit",
            Self::WaitTimeout => "cache.wait_timeout",
            Self::Fallback => "cache.fallback",
            Self::LockReleased => "cache.lock_released",
            Self::LockLost => "cache.lock_lost",
            Self::SharedError => "cache.shared_error",
            Self::LocalError => "cache.local_error",
            Self::Inserted => "cache.inserted",
            Self::Invalidated => "cache.invalidated",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::HitLocal | Self::HitShared | Self::Miss | Self::LockReleased | Self::LockLost => Severity::Debug,
            Self::LockAcquired
            | Self::LockContended
            | Self::LockVacated
            | Self::StampedeWaitHit
            | Self::Inserted
            | Self::Invalidated => Severity::Info,
            Self::WaitTimeout | Self::Fallback | Self::SharedError | Self::LocalError => Severity::Warn,
            Self::Corrupt | Self::EncodeFailed => Severity::Error,
        }
    }
}

/// Emits cache events for one cache instance.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CacheTelemetry {
    name: CacheName,
}

impl CacheTelemetry {
    pub fn new(name: CacheName) -> Self {
        Self { name }
    }

    pub fn record(self, operation: CacheOperation, activity: CacheActivity, tier: Tier, key: &str) {
        Self::emit(self.name, operation, activity, Some(tier), key, None);
    }

    pub fn record_error(self, operation: CacheOperation, activity: CacheActivity, tier: Tier, key: &str, error: &Error) {
        Self::emit(self.name, operation, activity, Some(tier), key, Some(error));
    }

    /// Records a failure that happened before any tier was involved.
    pub fn record_codec_error(self, operation: CacheOperation, activity: CacheActivity, key: &str, error: &Error) {
        Self::emit(self.name, operation, activity, None, key, Some(error));
    }

    fn emit(cache_name: CacheName, operation: CacheOperation, activity: CacheActivity, tier: Option<Tier>, key: &str, error: Option<&Error>) {
        let op = operation.as_str();
        let ev = activity.as_str();
        let tier = tier.map(Tier::as_str);
        let error = error.map(tracing::field::display);

        // Tracing level must be constant, so we use a macro to select the appropriate level.
        macro_rules! emit_event {
            ($level:ident) => {
                tracing::$level!(
                    cache.name = cache_name,
                    cache.operation = op,
                    cache.activity = ev,
                    cache.tier = tier,
                    cache.key = key,
                    cache.error = error,
                    "cache.event"
                )
            };
        }

        match activity.severity() {
            Severity::Error => emit_event!(error),
            Severity::Warn => emit_event!(warn),
            Severity::Info => emit_event!(info),
            Severity::Debug => emit_event!(debug),
        }
    }
}
