use std::collections::HashMap;

use plaza_api_types::PostListQuery;
use tracing::{instrument, warn};

use crate::application::error::AppError;
use crate::cache::{Batch, Reply, StoreError};
use crate::cache::store::next_reply;
use crate::domain::entities::{CommunityRecord, PostDetail, PostRecord};
use crate::domain::types::{CommunityId, PostId, PostOrder, UserId};

use super::service::PostService;
use super::types::validate_page;

const SOURCE: &str = "application::posts::queries";

/// Author names and communities already fetched while assembling one response.
#[derive(Default)]
struct Lookups {
    authors: HashMap<UserId, String>,
    communities: HashMap<CommunityId, CommunityRecord>,
}

impl PostService {
    /// Read one post: negative marker, then cache, then the durable store.
    ///
    /// Every successful read counts a view for `viewer`, and the returned view
    /// count is the live counter. A read costs at most one durable round trip
    /// for the post itself.
    #[instrument(skip(self))]
    pub async fn get_post(
        &self,
        post: PostId,
        viewer: Option<UserId>,
    ) -> Result<PostDetail, AppError> {
        let cache = &self.engine.cache;
        if cache.is_marked_not_found(post).await {
            return Err(AppError::not_found("post"));
        }

        let known_author = self.cached_author(post).await;
        if let Some(author) = known_author
            && let Some(detail) = cache.get(author, post).await
        {
            return Ok(self.refresh_cached(post, viewer, detail, None).await);
        }

        let Some(record) = self.reader.find_post(post).await? else {
            self.remember_missing(post).await;
            return Err(AppError::not_found("post"));
        };
        let author = record.author_id;
        let snapshot = record.view_count;
        if known_author.is_none() {
            if let Err(err) = cache.remember_author(post, author).await {
                warn!(target = SOURCE, post_id = %post, error = %err, "failed to record post author");
            }
            if let Some(detail) = cache.get(author, post).await {
                return Ok(self.refresh_cached(post, viewer, detail, Some(snapshot)).await);
            }
        }

        let mut detail = self.assemble(record, &mut Lookups::default()).await?;
        detail.vote_count = self.fresh_vote_count(post, 0).await;
        self.restore_counter(post, snapshot).await;
        detail.view_count = self.count_view(post, viewer, snapshot).await;

        cache.backfill(author, post, detail.clone());
        Ok(detail)
    }

    /// Bring a cached representation up to date with live votes and count the
    /// view. `durable` is the persisted view snapshot when the caller already
    /// holds the row.
    async fn refresh_cached(
        &self,
        post: PostId,
        viewer: Option<UserId>,
        mut detail: PostDetail,
        durable: Option<i64>,
    ) -> PostDetail {
        detail.vote_count = self.fresh_vote_count(post, detail.vote_count).await;

        if !self.counter_is_live(post).await {
            let floor = detail.post.view_count.max(detail.view_count);
            let snapshot = match durable {
                Some(snapshot) => snapshot,
                None => match self.reader.find_post(post).await {
                    Ok(record) => record.map_or(0, |record| record.view_count),
                    Err(err) => {
                        warn!(target = SOURCE, post_id = %post, error = %err, "durable view snapshot unavailable");
                        0
                    }
                },
            };
            self.restore_counter(post, snapshot.max(floor)).await;
        }

        detail.view_count = self.count_view(post, viewer, detail.view_count).await;
        detail
    }

    /// Whether the live view counter of `post` exists. Store failures answer
    /// `true` so the read does not fall through to the durable store.
    async fn counter_is_live(&self, post: PostId) -> bool {
        match self.engine.views.view_counts(&[post]).await {
            Ok(counts) => !matches!(counts.as_slice(), [None]),
            Err(err) => {
                warn!(target = SOURCE, post_id = %post, error = %err, "view counter lookup failed");
                true
            }
        }
    }

    /// Recreate a lost live counter from `snapshot`. An existing counter wins.
    async fn restore_counter(&self, post: PostId, snapshot: i64) {
        if let Err(err) = self.engine.views.seed(&[(post, snapshot)]).await {
            warn!(target = SOURCE, post_id = %post, error = %err, "failed to seed view counter");
        }
    }

    /// One page of assembled posts. Listing does not count views.
    #[instrument(skip(self, query), fields(order = %query.order, page = query.page, size = query.size))]
    pub async fn get_post_list(&self, query: &PostListQuery) -> Result<Vec<PostDetail>, AppError> {
        validate_page(query.page, query.size)?;
        let community = query.community().map(CommunityId);

        let mut details = if query.use_index && query.order != PostOrder::Score {
            let records = self
                .reader
                .list_posts_by_order(query.order, community, query.page, query.size)
                .await?;
            self.assemble_listed(records).await
        } else {
            let ids = self
                .engine
                .ranking
                .get_page(query.order, query.page, query.size, community)
                .await?;
            self.details_for(&ids).await?
        };

        self.overlay_counters(&mut details).await;
        Ok(details)
    }

    /// Author of `post` as recorded in the fast store.
    async fn cached_author(&self, post: PostId) -> Option<UserId> {
        match self.engine.cache.author_of(post).await {
            Ok(author) => author,
            Err(err) => {
                warn!(target = SOURCE, post_id = %post, error = %err, "author lookup in fast store failed");
                None
            }
        }
    }

    /// Author of `post` from the fast store, falling back to the durable store.
    pub(crate) async fn resolve_author(&self, post: PostId) -> Result<Option<UserId>, AppError> {
        if let Some(author) = self.cached_author(post).await {
            return Ok(Some(author));
        }

        let author = self.reader.find_post_author(post).await?;
        if let Some(author) = author
            && let Err(err) = self.engine.cache.remember_author(post, author).await
        {
            warn!(target = SOURCE, post_id = %post, error = %err, "failed to record post author");
        }
        Ok(author)
    }

    async fn remember_missing(&self, post: PostId) {
        let cache = &self.engine.cache;
        if let Err(err) = cache
            .mark_not_found(post, cache.config().not_found_ttl())
            .await
        {
            warn!(target = SOURCE, post_id = %post, error = %err, "failed to set not-found marker");
        }
    }

    /// Cached details for `ids` in order, assembling and backfilling misses.
    async fn details_for(&self, ids: &[PostId]) -> Result<Vec<PostDetail>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cache = &self.engine.cache;

        let authors = match cache.authors_of(ids).await {
            Ok(authors) => authors,
            Err(err) => {
                warn!(target = SOURCE, error = %err, "batched author lookup failed");
                vec![None; ids.len()]
            }
        };
        let known: Vec<(usize, (UserId, PostId))> = ids
            .iter()
            .zip(&authors)
            .enumerate()
            .filter_map(|(slot, (post, author))| author.map(|author| (slot, (author, *post))))
            .collect();
        let entries: Vec<(UserId, PostId)> = known.iter().map(|(_, entry)| *entry).collect();
        let hits = cache.get_many(&entries).await;

        let mut slots: Vec<Option<PostDetail>> = vec![None; ids.len()];
        for ((slot, _), hit) in known.iter().zip(hits) {
            slots[*slot] = hit;
        }

        let missing: Vec<PostId> = ids
            .iter()
            .zip(&slots)
            .filter(|(_, detail)| detail.is_none())
            .map(|(post, _)| *post)
            .collect();
        if !missing.is_empty() {
            let mut records: HashMap<PostId, PostRecord> = self
                .reader
                .list_posts_by_ids(&missing)
                .await?
                .into_iter()
                .map(|record| (record.id, record))
                .collect();
            let mut lookups = Lookups::default();
            for (post, slot) in ids.iter().zip(slots.iter_mut()) {
                if slot.is_some() {
                    continue;
                }
                let Some(record) = records.remove(post) else {
                    warn!(target = SOURCE, post_id = %post, "ranked post missing from durable store");
                    continue;
                };
                let author = record.author_id;
                match self.assemble(record, &mut lookups).await {
                    Ok(detail) => {
                        cache.backfill(author, *post, detail.clone());
                        *slot = Some(detail);
                    }
                    Err(err) => {
                        warn!(target = SOURCE, post_id = %post, error = %err, "skipping post that failed to assemble");
                    }
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    async fn assemble_listed(&self, records: Vec<PostRecord>) -> Vec<PostDetail> {
        let mut lookups = Lookups::default();
        let mut details = Vec::with_capacity(records.len());
        for record in records {
            let post = record.id;
            match self.assemble(record, &mut lookups).await {
                Ok(detail) => details.push(detail),
                Err(err) => {
                    warn!(target = SOURCE, post_id = %post, error = %err, "skipping post that failed to assemble");
                }
            }
        }
        details
    }

    /// Join a durable row with its author and community. Counters start from the
    /// durable snapshot and are overlaid by the caller.
    async fn assemble(
        &self,
        record: PostRecord,
        lookups: &mut Lookups,
    ) -> Result<PostDetail, AppError> {
        let author_name = match lookups.authors.get(&record.author_id) {
            Some(name) => name.clone(),
            None => {
                let user = self
                    .users
                    .find_user(record.author_id)
                    .await?
                    .ok_or(AppError::not_found("user"))?;
                lookups.authors.insert(user.id, user.username.clone());
                user.username
            }
        };
        let community = match lookups.communities.get(&record.community_id) {
            Some(community) => community.clone(),
            None => {
                let community = self
                    .communities
                    .find_community(record.community_id)
                    .await?
                    .ok_or(AppError::not_found("community"))?;
                lookups.communities.insert(community.id, community.clone());
                community
            }
        };

        Ok(PostDetail {
            view_count: record.view_count,
            vote_count: 0,
            post: record,
            community,
            author_name,
        })
    }

    /// Replace vote and view counts with live values, read in one batch.
    /// On failure the assembled values are kept.
    async fn overlay_counters(&self, details: &mut [PostDetail]) {
        if details.is_empty() {
            return;
        }
        let batch = Batch::new().extend(details.iter().flat_map(|detail| {
            [
                self.engine.votes.up_votes_command(detail.post.id),
                self.engine.views.count_command(detail.post.id),
            ]
        }));

        let counters = match self.engine.store.exec(batch).await {
            Ok(replies) => parse_counters(replies, details.len()),
            Err(err) => Err(err),
        };
        match counters {
            Ok(counters) => {
                for (detail, (votes, views)) in details.iter_mut().zip(counters) {
                    detail.vote_count = votes;
                    if let Some(views) = views {
                        detail.view_count = views;
                    }
                }
            }
            Err(err) => {
                warn!(target = SOURCE, posts = details.len(), error = %err, "counter overlay failed");
            }
        }
    }

    async fn fresh_vote_count(&self, post: PostId, fallback: i64) -> i64 {
        match self.engine.votes.up_votes(&[post]).await {
            Ok(counts) => counts.first().copied().unwrap_or(fallback),
            Err(err) => {
                warn!(target = SOURCE, post_id = %post, error = %err, "vote count unavailable");
                fallback
            }
        }
    }

    /// Record a view; a failing counter never fails the read.
    async fn count_view(&self, post: PostId, viewer: Option<UserId>, fallback: i64) -> i64 {
        match self.engine.views.record_view(post, viewer).await {
            Ok(count) => count,
            Err(err) => {
                warn!(target = SOURCE, post_id = %post, error = %err, "view not recorded");
                fallback
            }
        }
    }
}

fn parse_counters(
    replies: Vec<Reply>,
    posts: usize,
) -> Result<Vec<(i64, Option<i64>)>, StoreError> {
    let mut replies = replies.into_iter();
    (0..posts)
        .map(|_| {
            let votes = next_reply(&mut replies)?.into_int()?;
            let views = next_reply(&mut replies)?.into_opt_counter()?;
            Ok((votes, views))
        })
        .collect()
}
