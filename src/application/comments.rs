//! Comments on posts. Comments live only in the durable store; they take no
//! part in ranking or caching.

use std::sync::Arc;

use plaza_api_types::CreateCommentRequest;
use tracing::{info, instrument};

use crate::application::error::AppError;
use crate::application::posts::{ensure_non_empty, validate_page};
use crate::application::repos::{CommentsRepo, CreateCommentParams, PostsRepo};
use crate::domain::entities::CommentRecord;
use crate::domain::ids::IdGenerator;
use crate::domain::types::{CommentId, PostId, UserId};
use crate::util::clock::Clock;

const SOURCE: &str = "application::comments";

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentsRepo>,
    posts: Arc<dyn PostsRepo>,
    ids: Arc<IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentsRepo>,
        posts: Arc<dyn PostsRepo>,
        ids: Arc<IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            comments,
            posts,
            ids,
            clock,
        }
    }

    /// Comment on a post, or reply to a comment on the same post.
    #[instrument(skip(self, request), fields(post_id = request.post_id))]
    pub async fn create_comment(
        &self,
        author: UserId,
        request: CreateCommentRequest,
    ) -> Result<CommentRecord, AppError> {
        ensure_non_empty(&request.content, "content")?;

        let post = PostId(request.post_id);
        self.posts
            .find_post_author(post)
            .await?
            .ok_or(AppError::not_found("post"))?;

        let parent = request.parent_id.map(CommentId);
        if let Some(parent) = parent {
            let parent = self
                .comments
                .find_comment(parent)
                .await?
                .ok_or(AppError::not_found("comment"))?;
            if parent.post_id != post {
                return Err(AppError::validation(
                    "a reply must belong to the same post as its parent",
                ));
            }
        }

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                id: CommentId(self.ids.next_id()?.get()),
                post_id: post,
                author_id: author,
                parent_id: parent,
                content: request.content,
                created_at: self.clock.now(),
            })
            .await?;

        info!(
            target = SOURCE,
            comment_id = %comment.id,
            post_id = %post,
            author_id = %author,
            "comment created"
        );
        Ok(comment)
    }

    pub async fn list_comments(
        &self,
        post: PostId,
        page: u32,
        size: u32,
    ) -> Result<Vec<CommentRecord>, AppError> {
        validate_page(page, size)?;
        Ok(self.comments.list_comments_by_post(post, page, size).await?)
    }
}
