//! Repository traits describing the durable store adapter.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{
    CommentRecord, CommunityRecord, PostRecord, RankSeed, UserRecord,
};
use crate::domain::types::{CommentId, CommunityId, PostId, PostOrder, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePostParams {
    pub id: PostId,
    pub author_id: UserId,
    pub community_id: CommunityId,
    pub title: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

/// Fields left as `None` keep their stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdatePostParams {
    pub id: PostId,
    pub title: Option<String>,
    pub content: Option<String>,
    pub community_id: Option<CommunityId>,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateCommentParams {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError>;

    async fn find_post_author(&self, id: PostId) -> Result<Option<UserId>, RepoError>;

    /// Posts for `ids`, returned in the order of `ids`; unknown ids are skipped.
    async fn list_posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<PostRecord>, RepoError>;

    /// One page of posts ordered by the durable indices. `PostOrder::View` sorts by
    /// the persisted view snapshot, newest first on ties.
    async fn list_posts_by_order(
        &self,
        order: PostOrder,
        community: Option<CommunityId>,
        page: u32,
        size: u32,
    ) -> Result<Vec<PostRecord>, RepoError>;

    /// Everything needed to rebuild in-memory rankings.
    async fn list_rank_seeds(&self) -> Result<Vec<RankSeed>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    /// Raise persisted view snapshots to the given counts; a snapshot is never
    /// lowered. Returns the number of rows matched.
    async fn bulk_update_view_counts(&self, counts: &[(PostId, i64)]) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait CommunitiesRepo: Send + Sync {
    async fn find_community(&self, id: CommunityId) -> Result<Option<CommunityRecord>, RepoError>;

    /// Every community, ordered by id.
    async fn list_communities(&self) -> Result<Vec<CommunityRecord>, RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError>;

    async fn find_comment(&self, id: CommentId) -> Result<Option<CommentRecord>, RepoError>;

    /// One page of the comments on `post`, oldest first.
    async fn list_comments_by_post(
        &self,
        post: PostId,
        page: u32,
        size: u32,
    ) -> Result<Vec<CommentRecord>, RepoError>;
}

/// Trait-object handles for every repository the services use.
#[derive(Clone)]
pub struct Repositories {
    pub posts: Arc<dyn PostsRepo>,
    pub post_writer: Arc<dyn PostsWriteRepo>,
    pub users: Arc<dyn UsersRepo>,
    pub communities: Arc<dyn CommunitiesRepo>,
    pub comments: Arc<dyn CommentsRepo>,
}

impl Repositories {
    /// Share one adapter implementing every repository trait.
    pub fn from_shared<R>(repo: Arc<R>) -> Self
    where
        R: PostsRepo + PostsWriteRepo + UsersRepo + CommunitiesRepo + CommentsRepo + 'static,
    {
        Self {
            posts: repo.clone(),
            post_writer: repo.clone(),
            users: repo.clone(),
            communities: repo.clone(),
            comments: repo,
        }
    }
}
