use std::time::Duration;

use plaza_api_types::{CreatePostRequest, UpdatePostRequest, VoteRequest};
use tracing::{error, info, instrument, warn};

use crate::application::error::AppError;
use crate::application::repos::{CreatePostParams, UpdatePostParams};
use crate::domain::entities::PostRecord;
use crate::domain::types::{CommunityId, PostId, UserId};
use crate::ranking::VoteOutcome;

use super::service::PostService;
use super::types::ensure_non_empty;

const SOURCE: &str = "application::posts::commands";

impl PostService {
    #[instrument(skip(self, request), fields(community_id = request.community_id))]
    pub async fn create_post(
        &self,
        author: UserId,
        request: CreatePostRequest,
    ) -> Result<PostRecord, AppError> {
        ensure_non_empty(&request.title, "title")?;
        ensure_non_empty(&request.content, "content")?;

        let community = CommunityId(request.community_id);
        self.communities
            .find_community(community)
            .await?
            .ok_or(AppError::not_found("community"))?;

        let params = CreatePostParams {
            id: self.ids.next_id()?,
            author_id: author,
            community_id: community,
            title: request.title,
            content: request.content,
            created_at: self.clock.now(),
        };
        let post = self.writer.create_post(params).await?;

        if let Err(err) = self
            .engine
            .ranking
            .add_post(post.id, post.community_id, post.created_at)
            .await
        {
            error!(
                target = SOURCE,
                post_id = %post.id,
                error = %err,
                "post persisted but not indexed; the next warmup will index it"
            );
            return Err(err.into());
        }
        if let Err(err) = self.engine.cache.remember_author(post.id, author).await {
            warn!(target = SOURCE, post_id = %post.id, error = %err, "failed to record post author");
        }

        metrics::counter!("plaza_post_created_total").increment(1);
        info!(target = SOURCE, post_id = %post.id, author_id = %author, "post created");
        Ok(post)
    }

    pub async fn vote(&self, user: UserId, request: VoteRequest) -> Result<VoteOutcome, AppError> {
        let outcome = self
            .engine
            .votes
            .vote(user, PostId(request.post_id), request.direction)
            .await?;
        Ok(outcome)
    }

    /// Update with a double delete: invalidate, write, invalidate again after
    /// the configured delay to evict copies repopulated from a stale read.
    pub async fn update_post(
        &self,
        user: UserId,
        request: UpdatePostRequest,
    ) -> Result<PostRecord, AppError> {
        let delay = self.engine.cache.config().double_delete_delay();
        self.update_with(user, request, delay, "double_delete").await
    }

    /// Same protocol as [`PostService::update_post`] with the longer
    /// consistency delay.
    pub async fn update_post_consistent(
        &self,
        user: UserId,
        request: UpdatePostRequest,
    ) -> Result<PostRecord, AppError> {
        let delay = self.engine.cache.config().consistency_delay();
        self.update_with(user, request, delay, "consistency").await
    }

    #[instrument(skip(self, request), fields(post_id = request.post_id))]
    async fn update_with(
        &self,
        user: UserId,
        request: UpdatePostRequest,
        delay: Duration,
        strategy: &'static str,
    ) -> Result<PostRecord, AppError> {
        if request.is_empty() {
            return Err(AppError::validation("update changes nothing"));
        }
        if let Some(title) = &request.title {
            ensure_non_empty(title, "title")?;
        }
        if let Some(content) = &request.content {
            ensure_non_empty(content, "content")?;
        }

        let post = PostId(request.post_id);
        let author = self
            .reader
            .find_post_author(post)
            .await?
            .ok_or(AppError::not_found("post"))?;
        if author != user {
            return Err(AppError::Unauthorized);
        }

        let community = request.community_id.map(CommunityId);
        if let Some(community) = community {
            self.communities
                .find_community(community)
                .await?
                .ok_or(AppError::not_found("community"))?;
        }

        if let Err(err) = self.engine.cache.invalidate(author, post).await {
            warn!(
                target = SOURCE,
                post_id = %post,
                error = %err,
                "initial invalidation failed; relying on the delayed delete"
            );
        }

        let updated = self
            .writer
            .update_post(UpdatePostParams {
                id: post,
                title: request.title,
                content: request.content,
                community_id: community,
                updated_at: self.clock.now(),
            })
            .await?;

        if let Some(community) = community
            && let Err(err) = self.engine.ranking.add_to_community(post, community).await
        {
            warn!(target = SOURCE, post_id = %post, error = %err, "failed to index post in new community");
        }

        self.engine.cache.invalidate_after(author, post, delay);
        metrics::counter!("plaza_post_updated_total", "strategy" => strategy).increment(1);
        info!(
            target = SOURCE,
            post_id = %post,
            delay_ms = delay.as_millis() as u64,
            "post updated"
        );
        Ok(updated)
    }

    /// Drop the cached representation and any negative marker of `post`.
    #[instrument(skip(self))]
    pub async fn clear_post_cache(&self, post: PostId) -> Result<(), AppError> {
        let author = self
            .resolve_author(post)
            .await?
            .ok_or(AppError::not_found("post"))?;
        self.engine.cache.invalidate(author, post).await?;
        self.engine.cache.clear_not_found(post).await?;
        info!(target = SOURCE, post_id = %post, "post cache cleared");
        Ok(())
    }

    /// Drop every cached post representation. Returns how many were removed.
    #[instrument(skip(self))]
    pub async fn clear_all_post_caches(&self) -> Result<usize, AppError> {
        let removed = self.engine.cache.clear_all().await?;
        info!(target = SOURCE, removed, "all post caches cleared");
        Ok(removed)
    }
}
