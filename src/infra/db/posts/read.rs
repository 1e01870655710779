use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::QueryBuilder;

use crate::application::repos::{PostsRepo, RepoError};
use crate::domain::entities::{PostRecord, RankSeed};
use crate::domain::types::{CommunityId, PostId, PostOrder, UserId};
use crate::infra::db::map_sqlx_error;
use crate::infra::db::util::page_offset;

use super::types::{PostRow, RankSeedRow};
use super::{POST_COLUMNS, PostgresRepositories};

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id.get())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn find_post_author(&self, id: PostId) -> Result<Option<UserId>, RepoError> {
        let author = sqlx::query_scalar::<_, i64>("SELECT author_id FROM posts WHERE id = $1")
            .bind(id.get())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(author.map(UserId))
    }

    async fn list_posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<PostRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<i64> = ids.iter().map(|id| id.get()).collect();
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(&raw)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut by_id: HashMap<PostId, PostRecord> = rows
            .into_iter()
            .map(|row| {
                let record = PostRecord::from(row);
                (record.id, record)
            })
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn list_posts_by_order(
        &self,
        order: PostOrder,
        community: Option<CommunityId>,
        page: u32,
        size: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let order_clause = match order {
            PostOrder::Time => " ORDER BY created_at DESC, id DESC",
            PostOrder::View => " ORDER BY view_count DESC, created_at DESC, id DESC",
            PostOrder::Score => {
                return Err(RepoError::InvalidInput {
                    message: "score order is only served by the ranking index".to_string(),
                });
            }
        };

        let mut qb = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts WHERE 1=1"));
        if let Some(community) = community {
            qb.push(" AND community_id = ");
            qb.push_bind(community.get());
        }
        qb.push(order_clause);
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(size));
        qb.push(" OFFSET ");
        qb.push_bind(page_offset(page, size));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn list_rank_seeds(&self) -> Result<Vec<RankSeed>, RepoError> {
        let rows = sqlx::query_as::<_, RankSeedRow>(
            "SELECT id, author_id, community_id, created_at, view_count FROM posts ORDER BY id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RankSeed::from).collect())
    }
}
