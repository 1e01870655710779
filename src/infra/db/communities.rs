use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{CommunitiesRepo, RepoError};
use crate::domain::entities::CommunityRecord;
use crate::domain::types::CommunityId;

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommunityRow {
    id: i64,
    name: String,
    introduction: String,
    created_at: OffsetDateTime,
}

impl From<CommunityRow> for CommunityRecord {
    fn from(row: CommunityRow) -> Self {
        Self {
            id: CommunityId(row.id),
            name: row.name,
            introduction: row.introduction,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CommunitiesRepo for PostgresRepositories {
    async fn find_community(&self, id: CommunityId) -> Result<Option<CommunityRecord>, RepoError> {
        let row = sqlx::query_as::<_, CommunityRow>(
            "SELECT id, name, introduction, created_at FROM communities WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CommunityRecord::from))
    }

    async fn list_communities(&self) -> Result<Vec<CommunityRecord>, RepoError> {
        let rows = sqlx::query_as::<_, CommunityRow>(
            "SELECT id, name, introduction, created_at FROM communities ORDER BY id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommunityRecord::from).collect())
    }
}
