use time::OffsetDateTime;

use crate::domain::entities::{PostRecord, RankSeed};
use crate::domain::types::{CommunityId, PostId, UserId};

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: i64,
    pub(crate) author_id: i64,
    pub(crate) community_id: i64,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) view_count: i64,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: PostId(row.id),
            author_id: UserId(row.author_id),
            community_id: CommunityId(row.community_id),
            title: row.title,
            content: row.content,
            view_count: row.view_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RankSeedRow {
    pub(crate) id: i64,
    pub(crate) author_id: i64,
    pub(crate) community_id: i64,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) view_count: i64,
}

impl From<RankSeedRow> for RankSeed {
    fn from(row: RankSeedRow) -> Self {
        Self {
            post_id: PostId(row.id),
            author_id: UserId(row.author_id),
            community_id: CommunityId(row.community_id),
            created_at: row.created_at,
            view_count: row.view_count,
        }
    }
}
