//! Request and response types shared between the Plaza engine and the code that
//! fronts it (request handlers, operational tooling).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Ordering applied to post listings. Every ordering is descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PostOrder {
    /// Newest first.
    #[default]
    Time,
    /// Highest vote score first.
    Score,
    /// Most viewed first.
    View,
}

impl PostOrder {
    pub const ALL: [PostOrder; 3] = [PostOrder::Time, PostOrder::Score, PostOrder::View];

    pub fn as_str(self) -> &'static str {
        match self {
            PostOrder::Time => "time",
            PostOrder::Score => "score",
            PostOrder::View => "view",
        }
    }
}

impl fmt::Display for PostOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown post order `{0}` (expected time, score or view)")]
pub struct UnknownOrder(pub String);

impl FromStr for PostOrder {
    type Err = UnknownOrder;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "time" => Ok(PostOrder::Time),
            "score" => Ok(PostOrder::Score),
            "view" => Ok(PostOrder::View),
            other => Err(UnknownOrder(other.to_string())),
        }
    }
}

/// A user's vote on a post. `Retract` removes any vote previously cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum VoteDirection {
    Down,
    Retract,
    Up,
}

impl VoteDirection {
    pub fn as_i8(self) -> i8 {
        match self {
            VoteDirection::Down => -1,
            VoteDirection::Retract => 0,
            VoteDirection::Up => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("vote direction must be -1, 0 or 1 (got {0})")]
pub struct InvalidDirection(pub i64);

impl TryFrom<i8> for VoteDirection {
    type Error = InvalidDirection;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(VoteDirection::Down),
            0 => Ok(VoteDirection::Retract),
            1 => Ok(VoteDirection::Up),
            other => Err(InvalidDirection(other.into())),
        }
    }
}

impl From<VoteDirection> for i8 {
    fn from(direction: VoteDirection) -> Self {
        direction.as_i8()
    }
}

/// Paged listing request. `community_id == 0` lists every community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostListQuery {
    pub community_id: i64,
    pub page: u32,
    pub size: u32,
    pub order: PostOrder,
    /// Serve `time`/`view` listings from the durable store indices instead of the
    /// in-memory ranking.
    pub use_index: bool,
}

impl Default for PostListQuery {
    fn default() -> Self {
        Self {
            community_id: 0,
            page: 1,
            size: DEFAULT_PAGE_SIZE,
            order: PostOrder::Time,
            use_index: false,
        }
    }
}

impl PostListQuery {
    pub fn community(&self) -> Option<i64> {
        (self.community_id != 0).then_some(self.community_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub community_id: i64,
    pub title: String,
    pub content: String,
}

/// Partial update of a post. Absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct UpdatePostRequest {
    pub post_id: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub community_id: Option<i64>,
}

impl UpdatePostRequest {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.community_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub post_id: i64,
    pub direction: VoteDirection,
}

/// New comment on a post; `parent_id` replies to an existing comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub post_id: i64,
    #[serde(default)]
    pub parent_id: Option<i64>,
    pub content: String,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReconcileSummary {
    pub counters: usize,
    pub persisted: bool,
    pub index_rebuilt: bool,
}

/// Distribution of sampled jittered TTLs, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JitterReport {
    pub base_ms: u64,
    pub percent: u32,
    pub samples: u32,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub expected_min_ms: u64,
    pub expected_max_ms: u64,
}

impl JitterReport {
    pub fn within_expected(&self) -> bool {
        self.min_ms >= self.expected_min_ms && self.max_ms <= self.expected_max_ms
    }
}
