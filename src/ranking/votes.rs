//! Vote engine.
//!
//! Each user holds at most one vote per post (`-1`, `+1`, or none). Changing it
//! moves the post's score by `(new - old) * score_per_vote`, so any sequence of
//! votes ending in direction `d` nets `d * score_per_vote` for that user.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, instrument};

use super::config::RankingConfig;
use super::index::RankingStore;
use crate::cache::keys::KeyLayout;
use crate::cache::store::{Batch, Command, FastStore, StoreError, next_reply};
use crate::domain::types::{PostId, UserId, VoteDirection};
use crate::util::clock::Clock;

const SOURCE: &str = "ranking::votes";

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("post not found")]
    PostNotFound,
    #[error("voting window for this post has closed")]
    WindowExpired,
    #[error("vote already recorded in this direction")]
    Duplicate,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl VoteError {
    fn outcome_label(&self) -> &'static str {
        match self {
            VoteError::PostNotFound => "not_found",
            VoteError::WindowExpired => "window_expired",
            VoteError::Duplicate => "duplicate",
            VoteError::Store(_) => "store_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoteOutcome {
    pub previous: VoteDirection,
    pub current: VoteDirection,
    pub delta: f64,
    /// Post score after the delta was applied.
    pub score: f64,
}

type VoteLocks = DashMap<(PostId, UserId), Arc<tokio::sync::Mutex<()>>>;

#[derive(Clone)]
pub struct VoteEngine {
    store: Arc<dyn FastStore>,
    keys: KeyLayout,
    ranking: RankingStore,
    config: RankingConfig,
    clock: Arc<dyn Clock>,
    locks: Arc<VoteLocks>,
}

impl VoteEngine {
    pub fn new(
        store: Arc<dyn FastStore>,
        keys: KeyLayout,
        ranking: RankingStore,
        config: RankingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            keys,
            ranking,
            config,
            clock,
            locks: Arc::new(DashMap::new()),
        }
    }

    #[instrument(skip(self))]
    pub async fn vote(
        &self,
        user: UserId,
        post: PostId,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, VoteError> {
        let result = if self.config.serialize_votes {
            let lock = self.locks.entry((post, user)).or_default().clone();
            let result = {
                let _turn = lock.lock().await;
                self.apply(user, post, direction).await
            };
            drop(lock);
            self.locks
                .remove_if(&(post, user), |_, held| Arc::strong_count(held) == 1);
            result
        } else {
            self.apply(user, post, direction).await
        };

        let outcome = match &result {
            Ok(_) => "applied",
            Err(err) => err.outcome_label(),
        };
        metrics::counter!("plaza_vote_total", "outcome" => outcome).increment(1);
        result
    }

    async fn apply(
        &self,
        user: UserId,
        post: PostId,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, VoteError> {
        let created_at = self
            .ranking
            .created_at(post)
            .await?
            .ok_or(VoteError::PostNotFound)?;
        if self.clock.now() - created_at > self.config.vote_window() {
            return Err(VoteError::WindowExpired);
        }

        let voters = self.keys.voters(post);
        let member = user.to_string();
        let previous = self
            .store
            .zscore(&voters, &member)
            .await?
            .map_or(VoteDirection::Retract, direction_from_score);
        if previous == direction {
            return Err(VoteError::Duplicate);
        }

        let diff = direction.as_i8() - previous.as_i8();
        let delta = f64::from(diff.signum()) * f64::from(diff.abs()) * self.config.score_per_vote;

        let record = match direction {
            VoteDirection::Retract => Command::ZRem {
                key: voters,
                member,
            },
            _ => Command::ZAdd {
                key: voters,
                member,
                score: f64::from(direction.as_i8()),
            },
        };
        let replies = self
            .store
            .exec(
                Batch::new()
                    .push(self.ranking.score_delta(post, delta))
                    .push(record),
            )
            .await?;
        let score = next_reply(&mut replies.into_iter())?.into_float()?;

        debug!(
            target = SOURCE,
            previous = previous.as_i8(),
            delta,
            score,
            "vote applied"
        );
        Ok(VoteOutcome {
            previous,
            current: direction,
            delta,
            score,
        })
    }

    /// The direction `user` currently holds on `post`.
    pub async fn direction_of(
        &self,
        user: UserId,
        post: PostId,
    ) -> Result<VoteDirection, StoreError> {
        Ok(self
            .store
            .zscore(&self.keys.voters(post), &user.to_string())
            .await?
            .map_or(VoteDirection::Retract, direction_from_score))
    }

    /// Command reading the number of up-votes on `post`.
    pub fn up_votes_command(&self, post: PostId) -> Command {
        Command::ZCount {
            key: self.keys.voters(post),
            min: 1.0,
            max: 1.0,
        }
    }

    /// Up-vote counts for `posts`, in order, fetched in one batch.
    pub async fn up_votes(&self, posts: &[PostId]) -> Result<Vec<i64>, StoreError> {
        if posts.is_empty() {
            return Ok(Vec::new());
        }
        let batch = Batch::new().extend(posts.iter().map(|post| self.up_votes_command(*post)));
        self.store
            .exec(batch)
            .await?
            .into_iter()
            .map(|reply| reply.into_int())
            .collect()
    }
}

fn direction_from_score(score: f64) -> VoteDirection {
    if score > 0.0 {
        VoteDirection::Up
    } else if score < 0.0 {
        VoteDirection::Down
    } else {
        VoteDirection::Retract
    }
}
