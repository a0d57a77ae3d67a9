// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cache configuration.
//!
//! [`CacheOptions`] is read once when a cache is built and never changes
//! afterwards. It can be built in code or deserialized; durations are written
//! as strings such as `"10m"`, `"24h"` or `"PT5M"`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_tier::{Error, Tier};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Well-known kinds of cached data, each with its own nominal TTL.
///
/// Categories whose [`tier`](Self::tier) is [`Tier::Local`] drive the local
/// TTL of an entry; the others drive its shared TTL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TtlCategory {
    /// Embedding vectors for a piece of text.
    Embedding,
    /// Results of frequently repeated retrieval queries.
    PopularQuery,
    /// Prompt and response pairs.
    PromptResponse,
    /// Workflow execution history.
    WorkflowHistory,
    /// Per-user session state.
    SessionState,
    /// Metadata about indexed documents. Effectively permanent.
    DocumentMetadata,
}

impl TtlCategory {
    /// Returns the tier whose TTL this category sets.
    #[must_use]
    pub const fn tier(self) -> Tier {
        match self {
            Self::Embedding | Self::PopularQuery | Self::PromptResponse => Tier::Local,
            Self::WorkflowHistory | Self::SessionState | Self::DocumentMetadata => Tier::Shared,
        }
    }
}

/// Configuration of a [`Cache`](crate::Cache).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::CacheOptions;
///
/// let mut options = CacheOptions::default();
/// options.namespace = "AgentApi:".to_string();
/// options.jitter_max = Duration::from_secs(600);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[non_exhaustive]
pub struct CacheOptions {
    /// Local TTL used when the caller gives none, and always when refilling from the shared tier.
    #[serde(with = "duration_text")]
    pub default_local_ttl: Duration,
    /// Shared TTL used when the caller gives none, before jitter.
    #[serde(with = "duration_text")]
    pub default_shared_ttl: Duration,

    /// Nominal TTL of [`TtlCategory::Embedding`].
    #[serde(with = "duration_text")]
    pub embedding_ttl: Duration,
    /// Nominal TTL of [`TtlCategory::PopularQuery`].
    #[serde(with = "duration_text")]
    pub popular_query_ttl: Duration,
    /// Nominal TTL of [`TtlCategory::PromptResponse`].
    #[serde(with = "duration_text")]
    pub prompt_response_ttl: Duration,
    /// Nominal TTL of [`TtlCategory::WorkflowHistory`].
    #[serde(with = "duration_text")]
    pub workflow_history_ttl: Duration,
    /// Nominal TTL of [`TtlCategory::SessionState`].
    #[serde(with = "duration_text")]
    pub session_state_ttl: Duration,
    /// Nominal TTL of [`TtlCategory::DocumentMetadata`].
    #[serde(with = "duration_text")]
    pub document_metadata_ttl: Duration,

    /// Smallest random offset added to every shared TTL.
    #[serde(with = "duration_text")]
    pub jitter_min: Duration,
    /// Largest random offset added to every shared TTL.
    #[serde(with = "duration_text")]
    pub jitter_max: Duration,

    /// Maximum number of local entries.
    pub local_capacity: u64,

    /// How long a recomputation lock lives in the shared store before it expires on its own.
    #[serde(with = "duration_text")]
    pub lock_lease: Duration,
    /// How often a caller that lost the lock race re-reads the shared tier.
    #[serde(with = "duration_text")]
    pub lock_poll_interval: Duration,
    /// How long a caller that lost the lock race waits before computing the value itself.
    #[serde(with = "duration_text")]
    pub lock_wait_budget: Duration,

    /// Page size hint for prefix scans.
    pub scan_page_size: usize,
    /// Maximum number of keys per batch delete during prefix removal.
    pub delete_batch_size: usize,

    /// Prepended to every shared-tier key and lock resource.
    pub namespace: String,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            default_local_ttl: 10 * MINUTE,
            default_shared_ttl: HOUR,
            embedding_ttl: DAY,
            popular_query_ttl: HOUR,
            prompt_response_ttl: 30 * MINUTE,
            workflow_history_ttl: 7 * DAY,
            session_state_ttl: DAY,
            document_metadata_ttl: 3650 * DAY,
            jitter_min: 5 * MINUTE,
            jitter_max: 15 * MINUTE,
            local_capacity: 10_000,
            lock_lease: Duration::from_secs(10),
            lock_poll_interval: Duration::from_millis(50),
            lock_wait_budget: Duration::from_secs(5),
            scan_page_size: 1000,
            delete_batch_size: 500,
            namespace: String::new(),
        }
    }
}

impl CacheOptions {
    /// Returns the nominal TTL configured for `category`.
    #[must_use]
    pub const fn category_ttl(&self, category: TtlCategory) -> Duration {
        match category {
            TtlCategory::Embedding => self.embedding_ttl,
            TtlCategory::PopularQuery => self.popular_query_ttl,
            TtlCategory::PromptResponse => self.prompt_response_ttl,
            TtlCategory::WorkflowHistory => self.workflow_history_ttl,
            TtlCategory::SessionState => self.session_state_ttl,
            TtlCategory::DocumentMetadata => self.document_metadata_ttl,
        }
    }

    /// Checks that the options describe a usable cache.
    ///
    /// # Errors
    ///
    /// Returns an [`ErrorKind::Config`](strata_tier::ErrorKind::Config) error
    /// naming the first invalid setting.
    pub fn validate(&self) -> Result<(), Error> {
        if self.jitter_min > self.jitter_max {
            return Err(Error::config(format!(
                "jitter_min ({:?}) is greater than jitter_max ({:?})",
                self.jitter_min, self.jitter_max
            )));
        }

        let non_zero = [
            ("default_local_ttl", self.default_local_ttl.is_zero()),
            ("default_shared_ttl", self.default_shared_ttl.is_zero()),
            ("lock_lease", self.lock_lease.is_zero()),
            ("lock_poll_interval", self.lock_poll_interval.is_zero()),
            ("local_capacity", self.local_capacity == 0),
            ("scan_page_size", self.scan_page_size == 0),
            ("delete_batch_size", self.delete_batch_size == 0),
        ];
        match non_zero.iter().find(|(_, is_zero)| *is_zero) {
            Some((name, _)) => Err(Error::config(format!("{name} must be greater than zero"))),
            None => Ok(()),
        }
    }
}

/// Per-call TTL overrides.
///
/// Unset tiers fall back to [`CacheOptions::default_local_ttl`] and
/// [`CacheOptions::default_shared_ttl`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use strata::{CacheOptions, EntryTtl, TtlCategory};
///
/// let ttl = EntryTtl::new().shared(Duration::from_secs(3600));
/// assert_eq!(ttl.local_ttl(), None);
///
/// let options = CacheOptions::default();
/// let ttl = EntryTtl::category(&options, TtlCategory::Embedding);
/// assert_eq!(ttl.local_ttl(), Some(Duration::from_secs(24 * 3600)));
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryTtl {
    local: Option<Duration>,
    shared: Option<Duration>,
}

impl EntryTtl {
    /// Uses the configured defaults for both tiers.
    #[must_use]
    pub const fn new() -> Self {
        Self { local: None, shared: None }
    }

    /// Overrides the local TTL.
    #[must_use]
    pub const fn local(mut self, ttl: Duration) -> Self {
        self.local = Some(ttl);
        self
    }

    /// Overrides the shared TTL. Jitter is still added on top.
    #[must_use]
    pub const fn shared(mut self, ttl: Duration) -> Self {
        self.shared = Some(ttl);
        self
    }

    /// Overrides the TTL of the tier `category` belongs to with its configured value.
    #[must_use]
    pub const fn category(options: &CacheOptions, category: TtlCategory) -> Self {
        let ttl = options.category_ttl(category);
        match category.tier() {
            Tier::Local => Self::new().local(ttl),
            Tier::Shared => Self::new().shared(ttl),
        }
    }

    /// Returns the local override, if any.
    #[must_use]
    pub const fn local_ttl(&self) -> Option<Duration> {
        self.local
    }

    /// Returns the shared override, if any.
    #[must_use]
    pub const fn shared_ttl(&self) -> Option<Duration> {
        self.shared
    }
}

/// Serde adapter reading and writing durations as `jiff::SignedDuration` text.
mod duration_text {
    use std::time::Duration;

    use jiff::SignedDuration;
    use serde::{Deserialize, Deserializer, Serializer, de, ser};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let signed = SignedDuration::try_from(*duration).map_err(ser::Error::custom)?;
        serializer.collect_str(&format_args!("{signed:#}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        let signed: SignedDuration = text
            .parse()
            .map_err(|e| de::Error::custom(format!("invalid duration {text:?}: {e}")))?;
        Duration::try_from(signed).map_err(|e| de::Error::custom(format!("invalid duration {text:?}: {e}")))
    }
}
