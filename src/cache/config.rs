//! Cache configuration.
//!
//! Controls post caching, negative markers, invalidation delays and the bound on
//! volatile keys held by the fast store, via the `[cache]` section of `plaza.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::keys::DEFAULT_PREFIX;

// Default values for cache configuration
const DEFAULT_POST_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_POST_JITTER_PERCENT: u32 = 20;
const DEFAULT_NOT_FOUND_TTL_SECONDS: u64 = 30;
const DEFAULT_NOT_FOUND_JITTER_PERCENT: u32 = 15;
const DEFAULT_DOUBLE_DELETE_DELAY_MS: u64 = 500;
const DEFAULT_CONSISTENCY_DELAY_MS: u64 = 1000;
const DEFAULT_MAX_VOLATILE_KEYS: usize = 100_000;

/// Cache configuration from `plaza.toml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Namespace prepended to every fast store key.
    pub key_prefix: String,
    /// Base TTL of an assembled post entry.
    pub post_ttl_seconds: u64,
    /// Jitter applied to post entry TTLs, in percent.
    pub post_jitter_percent: u32,
    /// Base TTL of a "post does not exist" marker.
    pub not_found_ttl_seconds: u64,
    /// Jitter applied to negative marker TTLs, in percent.
    pub not_found_jitter_percent: u32,
    /// Delay before the second delete of the delayed double-delete update path.
    pub double_delete_delay_ms: u64,
    /// Delay before re-invalidation on the strong-consistency update path.
    pub consistency_delay_ms: u64,
    /// Maximum number of keys carrying a TTL before LRU eviction kicks in.
    pub max_volatile_keys: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_PREFIX.to_string(),
            post_ttl_seconds: DEFAULT_POST_TTL_SECONDS,
            post_jitter_percent: DEFAULT_POST_JITTER_PERCENT,
            not_found_ttl_seconds: DEFAULT_NOT_FOUND_TTL_SECONDS,
            not_found_jitter_percent: DEFAULT_NOT_FOUND_JITTER_PERCENT,
            double_delete_delay_ms: DEFAULT_DOUBLE_DELETE_DELAY_MS,
            consistency_delay_ms: DEFAULT_CONSISTENCY_DELAY_MS,
            max_volatile_keys: DEFAULT_MAX_VOLATILE_KEYS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            key_prefix: settings.key_prefix.clone(),
            post_ttl_seconds: settings.post_ttl.as_secs(),
            post_jitter_percent: settings.post_jitter_percent,
            not_found_ttl_seconds: settings.not_found_ttl.as_secs(),
            not_found_jitter_percent: settings.not_found_jitter_percent,
            double_delete_delay_ms: settings.double_delete_delay.as_millis() as u64,
            consistency_delay_ms: settings.consistency_delay.as_millis() as u64,
            max_volatile_keys: settings.max_volatile_keys.get(),
        }
    }
}

impl CacheConfig {
    pub fn post_ttl(&self) -> Duration {
        Duration::from_secs(self.post_ttl_seconds)
    }

    pub fn not_found_ttl(&self) -> Duration {
        Duration::from_secs(self.not_found_ttl_seconds)
    }

    pub fn double_delete_delay(&self) -> Duration {
        Duration::from_millis(self.double_delete_delay_ms)
    }

    pub fn consistency_delay(&self) -> Duration {
        Duration::from_millis(self.consistency_delay_ms)
    }

    /// Returns the volatile key bound as NonZeroUsize, clamping to 1 if zero.
    pub fn max_volatile_keys_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_volatile_keys).unwrap_or(NonZeroUsize::MIN)
    }
}
