//! Ordered post indices.
//!
//! Three global sorted sets rank every post by creation time, vote score and view
//! count. Community listings read a derived index (community members ∩ global
//! index, max-aggregated) that is cached for a short jittered TTL and recomputed
//! only once it has expired.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, warn};

use super::config::RankingConfig;
use crate::cache::jitter::jittered_ttl;
use crate::cache::keys::KeyLayout;
use crate::cache::store::{Batch, Command, FastStore, StoreError, next_reply};
use crate::domain::entities::RankSeed;
use crate::domain::types::{CommunityId, PostId, PostOrder};

const SOURCE: &str = "ranking::index";

#[derive(Clone)]
pub struct RankingStore {
    store: Arc<dyn FastStore>,
    keys: KeyLayout,
    config: RankingConfig,
}

impl RankingStore {
    pub fn new(store: Arc<dyn FastStore>, keys: KeyLayout, config: RankingConfig) -> Self {
        Self {
            store,
            keys,
            config,
        }
    }

    /// Register a new post: time entry, zero score, community membership.
    pub async fn add_post(
        &self,
        post: PostId,
        community: CommunityId,
        created_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let member = post.to_string();
        let batch = Batch::new()
            .push(Command::ZAdd {
                key: self.keys.rank(PostOrder::Time),
                member: member.clone(),
                score: created_at.unix_timestamp() as f64,
            })
            .push(Command::ZAdd {
                key: self.keys.rank(PostOrder::Score),
                member: member.clone(),
                score: 0.0,
            })
            .push(Command::SAdd {
                key: self.keys.community(community),
                members: vec![member],
            });
        self.store.exec(batch).await?;
        Ok(())
    }

    /// Add `post` to another community's membership set. Membership only grows.
    pub async fn add_to_community(
        &self,
        post: PostId,
        community: CommunityId,
    ) -> Result<(), StoreError> {
        self.store
            .run(Command::SAdd {
                key: self.keys.community(community),
                members: vec![post.to_string()],
            })
            .await
            .map(|_| ())
    }

    /// Command moving `post`'s score by `delta`, for composition into a larger batch.
    pub fn score_delta(&self, post: PostId, delta: f64) -> Command {
        Command::ZIncrBy {
            key: self.keys.rank(PostOrder::Score),
            member: post.to_string(),
            delta,
        }
    }

    pub async fn adjust_score(&self, post: PostId, delta: f64) -> Result<f64, StoreError> {
        self.store.run(self.score_delta(post, delta)).await?.into_float()
    }

    pub async fn score(&self, post: PostId) -> Result<Option<f64>, StoreError> {
        self.store
            .zscore(&self.keys.rank(PostOrder::Score), &post.to_string())
            .await
    }

    /// Creation time recorded in the time index, if the post is known.
    pub async fn created_at(&self, post: PostId) -> Result<Option<OffsetDateTime>, StoreError> {
        let Some(seconds) = self
            .store
            .zscore(&self.keys.rank(PostOrder::Time), &post.to_string())
            .await?
        else {
            return Ok(None);
        };
        OffsetDateTime::from_unix_timestamp(seconds as i64)
            .map(Some)
            .map_err(|err| StoreError::UnexpectedReply {
                expected: "unix timestamp",
                found: format!("{seconds} ({err})"),
            })
    }

    /// Post ids ranked `(page-1)*size ..= page*size-1` in descending order.
    pub async fn get_page(
        &self,
        order: PostOrder,
        page: u32,
        size: u32,
        community: Option<CommunityId>,
    ) -> Result<Vec<PostId>, StoreError> {
        if page == 0 || size == 0 {
            return Ok(Vec::new());
        }
        let key = match community {
            None => self.keys.rank(order),
            Some(community) => self.community_index(order, community).await?,
        };

        let start = (page as usize - 1).saturating_mul(size as usize);
        let stop = start.saturating_add(size as usize - 1);
        let members = self.store.zrevrange(&key, start, stop).await?;

        Ok(members
            .into_iter()
            .filter_map(|member| match member.parse() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(target = SOURCE, key = %key, member = %member, "skipping malformed index member");
                    None
                }
            })
            .collect())
    }

    /// Key of the derived community index, computing it if it has expired.
    async fn community_index(
        &self,
        order: PostOrder,
        community: CommunityId,
    ) -> Result<String, StoreError> {
        let dest = self.keys.community_rank(order, community);
        if self.store.exists(&dest).await? {
            return Ok(dest);
        }

        let ttl = jittered_ttl(
            self.config.community_index_ttl(),
            self.config.community_index_jitter_percent,
        );
        let replies = self
            .store
            .exec(
                Batch::new()
                    .push(Command::ZInterStoreMax {
                        dest: dest.clone(),
                        sources: vec![self.keys.community(community), self.keys.rank(order)],
                    })
                    .push(Command::Expire {
                        key: dest.clone(),
                        ttl,
                    }),
            )
            .await?;
        let members = next_reply(&mut replies.into_iter())?.into_int()?;
        debug!(
            target = SOURCE,
            %order,
            community_id = %community,
            members,
            ttl_ms = ttl.as_millis() as u64,
            "recomputed community index"
        );
        Ok(dest)
    }

    pub async fn set_view_rank(&self, post: PostId, views: i64) -> Result<(), StoreError> {
        self.store
            .run(Command::ZAdd {
                key: self.keys.rank(PostOrder::View),
                member: post.to_string(),
                score: views as f64,
            })
            .await
            .map(|_| ())
    }

    /// Overwrite view ranks from a counter snapshot in one batch.
    pub async fn rebuild_view_index(&self, counts: &[(PostId, i64)]) -> Result<usize, StoreError> {
        if counts.is_empty() {
            return Ok(0);
        }
        let key = self.keys.rank(PostOrder::View);
        let batch = Batch::new().extend(counts.iter().map(|(post, views)| Command::ZAdd {
            key: key.clone(),
            member: post.to_string(),
            score: *views as f64,
        }));
        self.store.exec(batch).await?;
        Ok(counts.len())
    }

    /// Seed indices from durable rows without overwriting live entries.
    pub async fn warm(&self, seeds: &[RankSeed]) -> Result<usize, StoreError> {
        if seeds.is_empty() {
            return Ok(0);
        }
        let time_key = self.keys.rank(PostOrder::Time);
        let score_key = self.keys.rank(PostOrder::Score);
        let view_key = self.keys.rank(PostOrder::View);

        let batch = Batch::new().extend(seeds.iter().flat_map(|seed| {
            let member = seed.post_id.to_string();
            [
                Command::ZAddNx {
                    key: time_key.clone(),
                    member: member.clone(),
                    score: seed.created_at.unix_timestamp() as f64,
                },
                Command::ZAddNx {
                    key: score_key.clone(),
                    member: member.clone(),
                    score: 0.0,
                },
                Command::ZAddNx {
                    key: view_key.clone(),
                    member: member.clone(),
                    score: seed.view_count as f64,
                },
                Command::SAdd {
                    key: self.keys.community(seed.community_id),
                    members: vec![member],
                },
            ]
        }));
        self.store.exec(batch).await?;
        Ok(seeds.len())
    }
}
