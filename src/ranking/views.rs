//! Live view counters.
//!
//! Authenticated views are deduplicated per `(post, user)` by a marker key with
//! its own TTL; once the marker expires the same user counts again. Anonymous
//! views always count. New counts are pushed into the view index in the
//! background; reconciliation repairs any propagation that gets lost.

use std::sync::Arc;

use tracing::{instrument, warn};

use super::config::RankingConfig;
use super::index::RankingStore;
use crate::cache::deferred::DeferredTasks;
use crate::cache::jitter::jittered_ttl;
use crate::cache::keys::KeyLayout;
use crate::cache::store::{Batch, Command, FastStore, Reply, StoreError, next_reply};
use crate::domain::types::{PostId, UserId};

const SOURCE: &str = "ranking::views";
const SEEN: &str = "1";

#[derive(Clone)]
pub struct ViewCounter {
    store: Arc<dyn FastStore>,
    keys: KeyLayout,
    ranking: RankingStore,
    config: RankingConfig,
    deferred: DeferredTasks,
}

impl ViewCounter {
    pub fn new(
        store: Arc<dyn FastStore>,
        keys: KeyLayout,
        ranking: RankingStore,
        config: RankingConfig,
        deferred: DeferredTasks,
    ) -> Self {
        Self {
            store,
            keys,
            ranking,
            config,
            deferred,
        }
    }

    /// Count a view and return the post's live view count.
    #[instrument(skip(self))]
    pub async fn record_view(
        &self,
        post: PostId,
        viewer: Option<UserId>,
    ) -> Result<i64, StoreError> {
        let count = match viewer {
            None => self.increment(Batch::new(), post).await?,
            Some(user) => {
                let marker = self.keys.viewed(post, user);
                let mut replies = self
                    .store
                    .exec(
                        Batch::new()
                            .push(Command::Exists {
                                key: marker.clone(),
                            })
                            .push(self.count_command(post)),
                    )
                    .await?
                    .into_iter();
                let seen = next_reply(&mut replies)?.into_bool()?;
                let current = next_reply(&mut replies)?.into_counter()?;
                if seen {
                    metrics::counter!("plaza_view_recorded_total", "deduplicated" => "true")
                        .increment(1);
                    return Ok(current);
                }

                let marker_ttl = jittered_ttl(
                    self.config.viewer_marker_ttl(),
                    self.config.viewer_marker_jitter_percent,
                );
                let guarded = Batch::new()
                    .require_absent(marker.clone())
                    .push(Command::Set {
                        key: marker,
                        value: SEEN.to_string(),
                        ttl: Some(marker_ttl),
                    });
                match self.increment(guarded, post).await {
                    Ok(count) => count,
                    // Another request by the same viewer won the race.
                    Err(StoreError::Conflict { .. }) => {
                        metrics::counter!("plaza_view_recorded_total", "deduplicated" => "true")
                            .increment(1);
                        return self.current(post).await;
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        metrics::counter!("plaza_view_recorded_total", "deduplicated" => "false").increment(1);
        self.propagate(post, count);
        Ok(count)
    }

    /// Append counter increment commands to `batch` and run it; returns the new count.
    async fn increment(&self, batch: Batch, post: PostId) -> Result<i64, StoreError> {
        let key = self.keys.views(post);
        let counter_ttl = jittered_ttl(
            self.config.view_counter_ttl(),
            self.config.view_counter_jitter_percent,
        );
        let leading = batch.len();
        let replies = self
            .store
            .exec(
                batch
                    .push(Command::Incr { key: key.clone() })
                    .push(Command::Expire {
                        key,
                        ttl: counter_ttl,
                    }),
            )
            .await?;
        let mut replies = replies.into_iter().skip(leading);
        next_reply(&mut replies)?.into_int()
    }

    fn propagate(&self, post: PostId, count: i64) {
        let ranking = self.ranking.clone();
        self.deferred.spawn("view_rank_propagation", async move {
            ranking.set_view_rank(post, count).await
        });
    }

    /// Command reading the live counter of `post`.
    pub fn count_command(&self, post: PostId) -> Command {
        Command::Get {
            key: self.keys.views(post),
        }
    }

    /// Live count, or zero when no counter exists.
    pub async fn current(&self, post: PostId) -> Result<i64, StoreError> {
        self.store.run(self.count_command(post)).await?.into_counter()
    }

    /// Live counts for `posts`, in order; `None` where no counter exists.
    pub async fn view_counts(&self, posts: &[PostId]) -> Result<Vec<Option<i64>>, StoreError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let batch = Batch::new().extend(posts.iter().map(|post| self.count_command(*post)));
        self.store
            .exec(batch)
            .await?
            .into_iter()
            .map(Reply::into_opt_counter)
            .collect()
    }

    /// Every live counter, read in one batch after a key scan.
    pub async fn snapshot(&self) -> Result<Vec<(PostId, i64)>, StoreError> {
        let keys = self.store.scan_prefix(&self.keys.views_prefix()).await?;
        let posts: Vec<PostId> = keys
            .iter()
            .filter_map(|key| {
                let post = self.keys.post_from_views_key(key);
                if post.is_none() {
                    warn!(target = SOURCE, key = %key, "ignoring malformed view counter key");
                }
                post
            })
            .collect();

        let counts = self.view_counts(&posts).await?;
        Ok(posts
            .into_iter()
            .zip(counts)
            // Counters that expired between the scan and the read are skipped.
            .filter_map(|(post, count)| count.map(|count| (post, count)))
            .collect())
    }

    /// Create counters from durable snapshots; existing live counters win.
    pub async fn seed(&self, counts: &[(PostId, i64)]) -> Result<usize, StoreError> {
        if counts.is_empty() {
            return Ok(0);
        }
        let batch = Batch::new().extend(counts.iter().map(|(post, count)| Command::SetNx {
            key: self.keys.views(*post),
            value: count.to_string(),
            ttl: Some(jittered_ttl(
                self.config.view_counter_ttl(),
                self.config.view_counter_jitter_percent,
            )),
        }));
        let created = self
            .store
            .exec(batch)
            .await?
            .into_iter()
            .map(Reply::into_bool)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(|created| *created)
            .count();
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::memory::MemoryStore;
    use crate::domain::types::PostOrder;

    fn counter() -> (ViewCounter, RankingStore, DeferredTasks) {
        let store: Arc<dyn FastStore> = Arc::new(MemoryStore::default());
        let keys = KeyLayout::default();
        let config = RankingConfig::default();
        let ranking = RankingStore::new(store.clone(), keys.clone(), config.clone());
        let deferred = DeferredTasks::new();
        let views = ViewCounter::new(store, keys, ranking.clone(), config, deferred.clone());
        (views, ranking, deferred)
    }

    #[tokio::test]
    async fn repeat_views_by_one_user_count_once() {
        let (views, _, _) = counter();
        for _ in 0..5 {
            assert_eq!(
                views
                    .record_view(PostId(1), Some(UserId(9)))
                    .await
                    .expect("view"),
                1
            );
        }
        assert_eq!(views.current(PostId(1)).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn anonymous_views_always_count() {
        let (views, _, _) = counter();
        for expected in 1..=4 {
            assert_eq!(
                views.record_view(PostId(1), None).await.expect("view"),
                expected
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn marker_expiry_allows_counting_again() {
        let (views, _, _) = counter();
        views
            .record_view(PostId(1), Some(UserId(9)))
            .await
            .expect("view");

        tokio::time::advance(Duration::from_secs(24 * 3600 + 3 * 3600)).await;
        assert_eq!(
            views
                .record_view(PostId(1), Some(UserId(9)))
                .await
                .expect("view"),
            2
        );
    }

    #[tokio::test]
    async fn new_counts_propagate_to_view_index() {
        let (views, ranking, deferred) = counter();
        for _ in 0..3 {
            views.record_view(PostId(2), None).await.expect("view");
        }
        views.record_view(PostId(1), None).await.expect("view");
        deferred.drain().await;

        let order = ranking
            .get_page(PostOrder::View, 1, 10, None)
            .await
            .expect("page");
        assert_eq!(order, vec![PostId(2), PostId(1)]);
    }

    #[tokio::test]
    async fn snapshot_lists_every_counter() {
        let (views, _, _) = counter();
        views.record_view(PostId(1), None).await.expect("view");
        views.record_view(PostId(1), None).await.expect("view");
        views.record_view(PostId(3), Some(UserId(1))).await.expect("view");

        let mut snapshot = views.snapshot().await.expect("snapshot");
        snapshot.sort();
        assert_eq!(snapshot, vec![(PostId(1), 2), (PostId(3), 1)]);
    }

    #[tokio::test]
    async fn seeding_never_lowers_live_counters() {
        let (views, _, _) = counter();
        for _ in 0..5 {
            views.record_view(PostId(1), None).await.expect("view");
        }
        let created = views
            .seed(&[(PostId(1), 2), (PostId(2), 40)])
            .await
            .expect("seed");
        assert_eq!(created, 1);
        assert_eq!(
            views
                .view_counts(&[PostId(1), PostId(2), PostId(3)])
                .await
                .expect("counts"),
            vec![Some(5), Some(40), None]
        );
    }
}
