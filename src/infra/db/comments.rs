use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CommentsRepo, CreateCommentParams, RepoError};
use crate::domain::entities::CommentRecord;
use crate::domain::types::{CommentId, PostId, UserId};

use super::util::page_offset;
use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: i64,
    post_id: i64,
    author_id: i64,
    parent_id: Option<i64>,
    content: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: CommentId(row.id),
            post_id: PostId(row.post_id),
            author_id: UserId(row.author_id),
            parent_id: row.parent_id.map(CommentId),
            content: row.content,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "INSERT INTO comments (id, post_id, author_id, parent_id, content, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING id, post_id, author_id, parent_id, content, created_at",
        )
        .bind(params.id.get())
        .bind(params.post_id.get())
        .bind(params.author_id.get())
        .bind(params.parent_id.map(CommentId::get))
        .bind(params.content)
        .bind(params.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_comment(&self, id: CommentId) -> Result<Option<CommentRecord>, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(
            "SELECT id, post_id, author_id, parent_id, content, created_at \
             FROM comments WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CommentRecord::from))
    }

    async fn list_comments_by_post(
        &self,
        post: PostId,
        page: u32,
        size: u32,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            "SELECT id, post_id, author_id, parent_id, content, created_at \
             FROM comments WHERE post_id = $1 \
             ORDER BY created_at, id \
             LIMIT $2 OFFSET $3",
        )
        .bind(post.get())
        .bind(i64::from(size))
        .bind(page_offset(page, size))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }
}
