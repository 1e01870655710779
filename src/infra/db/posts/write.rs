use async_trait::async_trait;

use crate::application::repos::{CreatePostParams, PostsWriteRepo, RepoError, UpdatePostParams};
use crate::domain::entities::PostRecord;
use crate::domain::types::PostId;
use crate::infra::db::map_sqlx_error;

use super::types::PostRow;
use super::{POST_COLUMNS, PostgresRepositories};

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "INSERT INTO posts (id, author_id, community_id, title, content, view_count, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, 0, $6, $6) \
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.id.get())
            .bind(params.author_id.get())
            .bind(params.community_id.get())
            .bind(params.title)
            .bind(params.content)
            .bind(params.created_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "UPDATE posts SET \
                 title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 community_id = COALESCE($4, community_id), \
                 updated_at = $5 \
             WHERE id = $1 \
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.id.get())
            .bind(params.title)
            .bind(params.content)
            .bind(params.community_id.map(|id| id.get()))
            .bind(params.updated_at)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn bulk_update_view_counts(&self, counts: &[(PostId, i64)]) -> Result<u64, RepoError> {
        if counts.is_empty() {
            return Ok(0);
        }
        let (ids, views): (Vec<i64>, Vec<i64>) = counts
            .iter()
            .map(|(post, views)| (post.get(), (*views).max(0)))
            .unzip();

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;
        let result = sqlx::query(
            "UPDATE posts AS p SET view_count = GREATEST(p.view_count, v.view_count) \
             FROM UNNEST($1::BIGINT[], $2::BIGINT[]) AS v(id, view_count) \
             WHERE p.id = v.id",
        )
        .bind(&ids)
        .bind(&views)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
