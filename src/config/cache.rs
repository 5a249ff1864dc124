//! `[cache]` section configuration.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// `[cache]` section in kcdshop.toml - freshness windows for app and
/// instruction caches.
///
/// The aggregate catalog ignores these and always lives for one day; it is
/// invalidated by file changes instead.
///
/// # Example
/// ```toml
/// [cache]
/// ttl_secs = 3600
/// swr_secs = 600
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Seconds an entry is served without recomputing.
    #[serde(default = "defaults::cache::ttl_secs")]
    #[educe(Default = defaults::cache::ttl_secs())]
    pub ttl_secs: u64,

    /// Seconds past the TTL during which the stale value is still served
    /// while a refresh runs in the background.
    #[serde(default = "defaults::cache::swr_secs")]
    #[educe(Default = defaults::cache::swr_secs())]
    pub swr_secs: u64,
}

impl CacheConfig {
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub const fn swr(&self) -> Duration {
        Duration::from_secs(self.swr_secs)
    }
}
