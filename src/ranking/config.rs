//! Ranking configuration: voting rules and counter lifetimes.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_VOTE_WINDOW_SECONDS: u64 = 7 * 24 * 3600;
const DEFAULT_SCORE_PER_VOTE: f64 = 432.0;
const DEFAULT_COMMUNITY_INDEX_TTL_SECONDS: u64 = 60;
const DEFAULT_COMMUNITY_INDEX_JITTER_PERCENT: u32 = 25;
const DEFAULT_VIEW_COUNTER_TTL_SECONDS: u64 = 7 * 24 * 3600;
const DEFAULT_VIEW_COUNTER_JITTER_PERCENT: u32 = 15;
const DEFAULT_VIEWER_MARKER_TTL_SECONDS: u64 = 24 * 3600;
const DEFAULT_VIEWER_MARKER_JITTER_PERCENT: u32 = 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// How long after creation a post accepts votes.
    pub vote_window_seconds: u64,
    /// Score moved by one unit of vote direction.
    pub score_per_vote: f64,
    /// Lifetime of a derived per-community index.
    pub community_index_ttl_seconds: u64,
    pub community_index_jitter_percent: u32,
    /// Idle lifetime of a live view counter.
    pub view_counter_ttl_seconds: u64,
    pub view_counter_jitter_percent: u32,
    /// Window during which repeat views by one user are not counted.
    pub viewer_marker_ttl_seconds: u64,
    pub viewer_marker_jitter_percent: u32,
    /// Serialize votes of one user on one post inside this process.
    pub serialize_votes: bool,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            vote_window_seconds: DEFAULT_VOTE_WINDOW_SECONDS,
            score_per_vote: DEFAULT_SCORE_PER_VOTE,
            community_index_ttl_seconds: DEFAULT_COMMUNITY_INDEX_TTL_SECONDS,
            community_index_jitter_percent: DEFAULT_COMMUNITY_INDEX_JITTER_PERCENT,
            view_counter_ttl_seconds: DEFAULT_VIEW_COUNTER_TTL_SECONDS,
            view_counter_jitter_percent: DEFAULT_VIEW_COUNTER_JITTER_PERCENT,
            viewer_marker_ttl_seconds: DEFAULT_VIEWER_MARKER_TTL_SECONDS,
            viewer_marker_jitter_percent: DEFAULT_VIEWER_MARKER_JITTER_PERCENT,
            serialize_votes: true,
        }
    }
}

impl From<&crate::config::RankingSettings> for RankingConfig {
    fn from(settings: &crate::config::RankingSettings) -> Self {
        Self {
            vote_window_seconds: settings.vote_window.as_secs(),
            score_per_vote: settings.score_per_vote,
            community_index_ttl_seconds: settings.community_index_ttl.as_secs(),
            community_index_jitter_percent: settings.community_index_jitter_percent,
            view_counter_ttl_seconds: settings.view_counter_ttl.as_secs(),
            view_counter_jitter_percent: settings.view_counter_jitter_percent,
            viewer_marker_ttl_seconds: settings.viewer_marker_ttl.as_secs(),
            viewer_marker_jitter_percent: settings.viewer_marker_jitter_percent,
            serialize_votes: settings.serialize_votes,
        }
    }
}

impl RankingConfig {
    pub fn vote_window(&self) -> Duration {
        Duration::from_secs(self.vote_window_seconds)
    }

    pub fn community_index_ttl(&self) -> Duration {
        Duration::from_secs(self.community_index_ttl_seconds)
    }

    pub fn view_counter_ttl(&self) -> Duration {
        Duration::from_secs(self.view_counter_ttl_seconds)
    }

    pub fn viewer_marker_ttl(&self) -> Duration {
        Duration::from_secs(self.viewer_marker_ttl_seconds)
    }
}
