//! Read-through cache of assembled posts.
//!
//! Positive entries are keyed by `(author, post)` and carry a jittered TTL.
//! Negative markers record that the durable store had no such post so repeated
//! lookups of a missing id stop at the fast store. Failures here are never
//! escalated: a broken or unreachable cache degrades to a miss.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::config::CacheConfig;
use super::deferred::DeferredTasks;
use super::jitter::jittered_ttl;
use super::keys::KeyLayout;
use super::store::{Batch, Command, FastStore, Reply, StoreError};
use crate::domain::entities::PostDetail;
use crate::domain::types::{PostId, UserId};

const SOURCE: &str = "cache::posts";
const NOT_FOUND_MARKER: &str = "1";

#[derive(Clone)]
pub struct PostCache {
    store: Arc<dyn FastStore>,
    keys: KeyLayout,
    config: CacheConfig,
    deferred: DeferredTasks,
}

impl PostCache {
    pub fn new(
        store: Arc<dyn FastStore>,
        keys: KeyLayout,
        config: CacheConfig,
        deferred: DeferredTasks,
    ) -> Self {
        Self {
            store,
            keys,
            config,
            deferred,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // ========================================================================
    // Positive entries
    // ========================================================================

    /// Look up the cached representation. Corrupt entries are deleted and
    /// reported as a miss.
    pub async fn get(&self, author: UserId, post: PostId) -> Option<PostDetail> {
        let key = self.keys.post_cache(author, post);
        let raw = match self.store.get(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::counter!("plaza_post_cache_miss_total").increment(1);
                return None;
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    post_id = %post,
                    error = %err,
                    "post cache read failed; falling back to durable store"
                );
                metrics::counter!("plaza_post_cache_miss_total").increment(1);
                return None;
            }
        };

        match serde_json::from_str::<PostDetail>(&raw) {
            Ok(detail) => {
                metrics::counter!("plaza_post_cache_hit_total").increment(1);
                Some(detail)
            }
            Err(err) => {
                warn!(
                    target = SOURCE,
                    post_id = %post,
                    error = %err,
                    "discarding corrupt post cache entry"
                );
                metrics::counter!("plaza_post_cache_corrupt_total").increment(1);
                if let Err(err) = self.store.del(vec![key]).await {
                    warn!(target = SOURCE, post_id = %post, error = %err, "failed to delete corrupt entry");
                }
                None
            }
        }
    }

    /// Batched [`PostCache::get`]: one round trip for every `(author, post)` pair.
    /// Replies line up with `entries`; a failed read yields all misses.
    pub async fn get_many(&self, entries: &[(UserId, PostId)]) -> Vec<Option<PostDetail>> {
        if entries.is_empty() {
            return Vec::new();
        }
        let batch = Batch::new().extend(entries.iter().map(|(author, post)| Command::Get {
            key: self.keys.post_cache(*author, *post),
        }));
        let replies = match self.store.exec(batch).await {
            Ok(replies) => replies,
            Err(err) => {
                warn!(target = SOURCE, entries = entries.len(), error = %err, "batched post cache read failed");
                metrics::counter!("plaza_post_cache_miss_total").increment(entries.len() as u64);
                return vec![None; entries.len()];
            }
        };

        let mut corrupt = Vec::new();
        let details = entries
            .iter()
            .zip(replies.into_iter().chain(std::iter::repeat(Reply::Nil)))
            .map(|((author, post), reply)| {
                let raw = match reply.into_opt_str() {
                    Ok(Some(raw)) => raw,
                    _ => {
                        metrics::counter!("plaza_post_cache_miss_total").increment(1);
                        return None;
                    }
                };
                match serde_json::from_str::<PostDetail>(&raw) {
                    Ok(detail) => {
                        metrics::counter!("plaza_post_cache_hit_total").increment(1);
                        Some(detail)
                    }
                    Err(err) => {
                        warn!(target = SOURCE, post_id = %post, error = %err, "discarding corrupt post cache entry");
                        metrics::counter!("plaza_post_cache_corrupt_total").increment(1);
                        corrupt.push(self.keys.post_cache(*author, *post));
                        None
                    }
                }
            })
            .collect();

        if let Err(err) = self.store.del(corrupt).await {
            warn!(target = SOURCE, error = %err, "failed to delete corrupt entries");
        }
        details
    }

    /// Store `detail` under a TTL jittered around `base_ttl`.
    pub async fn set(
        &self,
        author: UserId,
        post: PostId,
        detail: &PostDetail,
        base_ttl: Duration,
    ) -> Result<(), StoreError> {
        let payload = serde_json::to_string(detail)
            .map_err(|err| StoreError::unavailable(format!("failed to encode post: {err}")))?;
        let ttl = jittered_ttl(base_ttl, self.config.post_jitter_percent);
        self.store
            .set(&self.keys.post_cache(author, post), payload, Some(ttl))
            .await?;
        debug!(target = SOURCE, post_id = %post, ttl_ms = ttl.as_millis() as u64, "cached post");
        Ok(())
    }

    /// Write `detail` back in the background with the configured post TTL.
    pub fn backfill(&self, author: UserId, post: PostId, detail: PostDetail) {
        let cache = self.clone();
        let ttl = self.config.post_ttl();
        self.deferred.spawn("post_cache_backfill", async move {
            cache.set(author, post, &detail, ttl).await
        });
    }

    pub async fn invalidate(&self, author: UserId, post: PostId) -> Result<(), StoreError> {
        self.store
            .del(vec![self.keys.post_cache(author, post)])
            .await
            .map(|_| ())
    }

    /// Delete the entry again once `delay` has elapsed. The caller does not wait.
    pub fn invalidate_after(&self, author: UserId, post: PostId, delay: Duration) {
        let cache = self.clone();
        self.deferred
            .spawn_after("post_cache_delayed_delete", delay, async move {
                cache.invalidate(author, post).await
            });
    }

    /// Remove every positive entry. Returns how many were deleted.
    pub async fn clear_all(&self) -> Result<usize, StoreError> {
        let keys = self
            .store
            .scan_prefix(&self.keys.post_cache_prefix())
            .await?;
        let removed = self.store.del(keys).await?;
        Ok(removed.max(0) as usize)
    }

    // ========================================================================
    // Negative markers
    // ========================================================================

    pub async fn mark_not_found(&self, post: PostId, base_ttl: Duration) -> Result<(), StoreError> {
        let ttl = jittered_ttl(base_ttl, self.config.not_found_jitter_percent);
        self.store
            .set(
                &self.keys.missing(post),
                NOT_FOUND_MARKER.to_string(),
                Some(ttl),
            )
            .await
    }

    /// Unreachable stores read as "not marked" so the durable path still runs.
    pub async fn is_marked_not_found(&self, post: PostId) -> bool {
        match self.store.exists(&self.keys.missing(post)).await {
            Ok(marked) => {
                if marked {
                    metrics::counter!("plaza_negative_cache_hit_total").increment(1);
                }
                marked
            }
            Err(err) => {
                warn!(target = SOURCE, post_id = %post, error = %err, "negative marker check failed");
                false
            }
        }
    }

    pub async fn clear_not_found(&self, post: PostId) -> Result<(), StoreError> {
        self.store.del(vec![self.keys.missing(post)]).await.map(|_| ())
    }

    // ========================================================================
    // Author lookup
    // ========================================================================

    /// Author of `post` as recorded at creation or warmup.
    pub async fn author_of(&self, post: PostId) -> Result<Option<UserId>, StoreError> {
        let raw = self.store.get(&self.keys.author(post)).await?;
        Ok(raw.and_then(|raw| raw.parse().ok()))
    }

    /// Batched [`PostCache::author_of`].
    pub async fn authors_of(&self, posts: &[PostId]) -> Result<Vec<Option<UserId>>, StoreError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let batch = Batch::new().extend(posts.iter().map(|post| Command::Get {
            key: self.keys.author(*post),
        }));
        self.store
            .exec(batch)
            .await?
            .into_iter()
            .map(|reply| Ok(reply.into_opt_str()?.and_then(|raw| raw.parse().ok())))
            .collect()
    }

    /// Batched [`PostCache::remember_author`]; returns how many were newly recorded.
    pub async fn remember_authors(&self, entries: &[(PostId, UserId)]) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let batch = Batch::new().extend(entries.iter().map(|(post, author)| Command::SetNx {
            key: self.keys.author(*post),
            value: author.to_string(),
            ttl: None,
        }));
        let mut created = 0;
        for reply in self.store.exec(batch).await? {
            if reply.into_bool()? {
                created += 1;
            }
        }
        Ok(created)
    }

    pub async fn remember_author(&self, post: PostId, author: UserId) -> Result<(), StoreError> {
        self.store
            .run(Command::SetNx {
                key: self.keys.author(post),
                value: author.to_string(),
                ttl: None,
            })
            .await
            .map(|_| ())
    }
}
