//! Fast store key layout.
//!
//! Every key lives under one namespace prefix so several deployments (or test
//! runs) can share a store without colliding.

use std::sync::Arc;

use crate::domain::types::{CommunityId, PostId, PostOrder, UserId};

pub const DEFAULT_PREFIX: &str = "plaza:";

#[derive(Debug, Clone)]
pub struct KeyLayout {
    prefix: Arc<str>,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl KeyLayout {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: Arc::from(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    // ------------------------------------------------------------------------
    // Ranking
    // ------------------------------------------------------------------------

    /// Global sorted index for `order`; members are post ids.
    pub fn rank(&self, order: PostOrder) -> String {
        format!("{}post:rank:{}", self.prefix, order.as_str())
    }

    /// Derived per-community index (community members ∩ global index).
    pub fn community_rank(&self, order: PostOrder, community: CommunityId) -> String {
        format!(
            "{}post:rank:{}:community:{}",
            self.prefix,
            order.as_str(),
            community
        )
    }

    /// Membership set of a community.
    pub fn community(&self, community: CommunityId) -> String {
        format!("{}community:{}", self.prefix, community)
    }

    /// Per-post sorted set of voters; member is the user id, score the direction.
    pub fn voters(&self, post: PostId) -> String {
        format!("{}post:voted:{}", self.prefix, post)
    }

    // ------------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------------

    pub fn views(&self, post: PostId) -> String {
        format!("{}{}", self.views_prefix(), post)
    }

    pub fn views_prefix(&self) -> String {
        format!("{}post:views:", self.prefix)
    }

    pub fn viewed(&self, post: PostId, user: UserId) -> String {
        format!("{}post:viewed:{}:{}", self.prefix, post, user)
    }

    // ------------------------------------------------------------------------
    // Post cache
    // ------------------------------------------------------------------------

    pub fn post_cache(&self, author: UserId, post: PostId) -> String {
        format!("{}{}:{}", self.post_cache_prefix(), author, post)
    }

    pub fn post_cache_prefix(&self) -> String {
        format!("{}post:cache:", self.prefix)
    }

    pub fn missing(&self, post: PostId) -> String {
        format!("{}post:missing:{}", self.prefix, post)
    }

    pub fn author(&self, post: PostId) -> String {
        format!("{}post:author:{}", self.prefix, post)
    }

    /// Recover the post id from a key built by [`Self::views`].
    pub fn post_from_views_key(&self, key: &str) -> Option<PostId> {
        key.strip_prefix(&self.views_prefix())?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_the_namespace_prefix() {
        let keys = KeyLayout::new("test:");
        assert_eq!(keys.rank(PostOrder::Score), "test:post:rank:score");
        assert_eq!(
            keys.community_rank(PostOrder::View, CommunityId(3)),
            "test:post:rank:view:community:3"
        );
        assert_eq!(keys.post_cache(UserId(9), PostId(4)), "test:post:cache:9:4");
        assert_eq!(keys.viewed(PostId(4), UserId(9)), "test:post:viewed:4:9");
    }

    #[test]
    fn views_key_round_trips_post_id() {
        let keys = KeyLayout::default();
        let key = keys.views(PostId(1234));
        assert_eq!(keys.post_from_views_key(&key), Some(PostId(1234)));
        assert_eq!(keys.post_from_views_key("plaza:post:views:nope"), None);
        assert_eq!(keys.post_from_views_key("plaza:other:1"), None);
    }
}
