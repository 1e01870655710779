//! Fast-store components shared by the post service and background jobs.

use std::sync::Arc;

use crate::cache::{CacheConfig, DeferredTasks, FastStore, KeyLayout, PostCache};
use crate::ranking::{RankingConfig, RankingStore, ViewCounter, VoteEngine};
use crate::util::clock::Clock;

/// Every component bound to one fast store and one key layout.
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn FastStore>,
    pub keys: KeyLayout,
    pub cache: PostCache,
    pub ranking: RankingStore,
    pub votes: VoteEngine,
    pub views: ViewCounter,
    pub deferred: DeferredTasks,
}

impl Engine {
    pub fn new(
        store: Arc<dyn FastStore>,
        cache_config: CacheConfig,
        ranking_config: RankingConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let keys = KeyLayout::new(&cache_config.key_prefix);
        let deferred = DeferredTasks::new();
        let ranking = RankingStore::new(store.clone(), keys.clone(), ranking_config.clone());
        let votes = VoteEngine::new(
            store.clone(),
            keys.clone(),
            ranking.clone(),
            ranking_config.clone(),
            clock,
        );
        let views = ViewCounter::new(
            store.clone(),
            keys.clone(),
            ranking.clone(),
            ranking_config,
            deferred.clone(),
        );
        let cache = PostCache::new(store.clone(), keys.clone(), cache_config, deferred.clone());

        Self {
            store,
            keys,
            cache,
            ranking,
            votes,
            views,
            deferred,
        }
    }
}
