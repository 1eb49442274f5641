//! Actor profile caching
//!
//! The resolver consults a [`ProfileCache`] before going to the network and
//! fills it after a successful lookup. Cache failures never fail a
//! resolution. [`MemoryProfileCache`] is the in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::actor::ActorProfile;
use crate::error::AppError;

const CACHE_NAME: &str = "actor_profile";

/// Cache collaborator keyed by the actor URL as given to the resolver
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileCache: Send + Sync {
    /// Cached profile for `uri`, if present and fresh
    async fn get(&self, uri: &str) -> Result<Option<ActorProfile>, AppError>;

    /// Store `profile` under `uri`
    async fn put(&self, uri: &str, profile: ActorProfile) -> Result<(), AppError>;
}

/// Cached profile entry
#[derive(Debug, Clone)]
struct CachedProfile {
    profile: ActorProfile,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedProfile {
    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// In-memory profile cache with a TTL and an entry cap
///
/// Safe for concurrent readers and writers.
pub struct MemoryProfileCache {
    /// Cache storage: actor URL -> cached profile
    cache: Arc<RwLock<HashMap<String, CachedProfile>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl MemoryProfileCache {
    /// Create new profile cache
    ///
    /// # Arguments
    /// * `default_ttl` - TTL for cached profiles (default: 24 hours)
    /// * `max_entries` - Entry cap; the oldest entry is evicted when full
    pub fn new(default_ttl: Option<Duration>, max_entries: usize) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            default_ttl: default_ttl.unwrap_or(Duration::from_secs(86_400)),
            max_entries: max_entries.max(1),
        }
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStats {
        let cache = self.cache.read().await;
        let total = cache.len();
        let valid = cache.values().filter(|v| v.is_valid()).count();

        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
        }
    }

    /// Prune expired entries
    pub async fn prune_expired(&self) {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, v| v.is_valid());
        let removed = before - cache.len();
        record_size(cache.len());

        if removed > 0 {
            tracing::info!(removed, "Pruned expired profile cache entries");
        }
    }
}

fn record_size(len: usize) {
    use crate::metrics::CACHE_SIZE;
    CACHE_SIZE
        .with_label_values(&[CACHE_NAME])
        .set(i64::try_from(len).unwrap_or(i64::MAX));
}

#[async_trait]
impl ProfileCache for MemoryProfileCache {
    async fn get(&self, uri: &str) -> Result<Option<ActorProfile>, AppError> {
        use crate::metrics::{CACHE_HITS_TOTAL, CACHE_MISSES_TOTAL};

        let cache = self.cache.read().await;
        match cache.get(uri) {
            Some(cached) if cached.is_valid() => {
                CACHE_HITS_TOTAL.with_label_values(&[CACHE_NAME]).inc();
                tracing::debug!(actor = %uri, "Profile cache hit");
                Ok(Some(cached.profile.clone()))
            }
            Some(_) => {
                CACHE_MISSES_TOTAL.with_label_values(&[CACHE_NAME]).inc();
                tracing::debug!(actor = %uri, "Profile cache entry expired");
                Ok(None)
            }
            None => {
                CACHE_MISSES_TOTAL.with_label_values(&[CACHE_NAME]).inc();
                Ok(None)
            }
        }
    }

    async fn put(&self, uri: &str, profile: ActorProfile) -> Result<(), AppError> {
        let mut cache = self.cache.write().await;

        if cache.len() >= self.max_entries && !cache.contains_key(uri) {
            cache.retain(|_, v| v.is_valid());
            if cache.len() >= self.max_entries {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, v)| v.cached_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }

        cache.insert(
            uri.to_string(),
            CachedProfile {
                profile,
                cached_at: Instant::now(),
                ttl: self.default_ttl,
            },
        );
        record_size(cache.len());
        Ok(())
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Total number of entries
    pub total_entries: usize,
    /// Number of valid (non-expired) entries
    pub valid_entries: usize,
    /// Number of expired entries
    pub expired_entries: usize,
}
