//! Domain entities mirrored from persistent storage, plus the assembled post view.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::types::{CommentId, CommunityId, PostId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    pub author_id: UserId,
    pub community_id: CommunityId,
    pub title: String,
    pub content: String,
    /// Durable snapshot of the view counter; lags the live value between
    /// reconciliation passes.
    pub view_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityRecord {
    pub id: CommunityId,
    pub name: String,
    pub introduction: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A comment on a post. `parent_id` is set for replies to another comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub parent_id: Option<CommentId>,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Fully assembled post as cached and returned to callers.
///
/// `vote_count` is the number of up-votes; `view_count` is the live counter when
/// one exists, otherwise the durable snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDetail {
    pub post: PostRecord,
    pub community: CommunityRecord,
    pub author_name: String,
    pub vote_count: i64,
    pub view_count: i64,
}

/// Minimal projection used to rebuild in-memory rankings from durable rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankSeed {
    pub post_id: PostId,
    pub author_id: UserId,
    pub community_id: CommunityId,
    pub created_at: OffsetDateTime,
    pub view_count: i64,
}

impl From<&PostRecord> for RankSeed {
    fn from(post: &PostRecord) -> Self {
        Self {
            post_id: post.id,
            author_id: post.author_id,
            community_id: post.community_id,
            created_at: post.created_at,
            view_count: post.view_count,
        }
    }
}
