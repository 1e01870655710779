//! Startup warmup: rebuild fast-store rankings from durable rows.
//!
//! Existing fast-store entries always win, so warming a store that already
//! holds live data is harmless.

use tracing::{info, instrument};

use crate::application::engine::Engine;
use crate::application::error::AppError;
use crate::application::repos::PostsRepo;
use crate::domain::entities::RankSeed;

const SOURCE: &str = "application::jobs::warmup";
const WARM_CHUNK: usize = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmupSummary {
    pub posts: usize,
    pub counters_seeded: usize,
    pub authors_recorded: usize,
}

#[instrument(skip_all)]
pub async fn warm_up(posts: &dyn PostsRepo, engine: &Engine) -> Result<WarmupSummary, AppError> {
    let seeds = posts.list_rank_seeds().await?;
    let mut summary = WarmupSummary {
        posts: seeds.len(),
        ..WarmupSummary::default()
    };

    for chunk in seeds.chunks(WARM_CHUNK) {
        let (counters, authors) = warm_chunk(chunk, engine).await?;
        summary.counters_seeded += counters;
        summary.authors_recorded += authors;
    }

    info!(
        target = SOURCE,
        posts = summary.posts,
        counters_seeded = summary.counters_seeded,
        authors_recorded = summary.authors_recorded,
        "fast store warmed from durable store"
    );
    Ok(summary)
}

/// Index one chunk of posts; returns `(counters seeded, authors recorded)`.
async fn warm_chunk(seeds: &[RankSeed], engine: &Engine) -> Result<(usize, usize), AppError> {
    engine.ranking.warm(seeds).await?;

    let counts: Vec<_> = seeds
        .iter()
        .map(|seed| (seed.post_id, seed.view_count))
        .collect();
    let counters = engine.views.seed(&counts).await?;

    let authors: Vec<_> = seeds
        .iter()
        .map(|seed| (seed.post_id, seed.author_id))
        .collect();
    let recorded = engine.cache.remember_authors(&authors).await?;

    Ok((counters, recorded))
}
