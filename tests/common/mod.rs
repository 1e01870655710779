//! Shared fixtures: an in-memory durable store that counts calls, a fast store
//! that can be switched into failure, and a fully wired post service.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use plaza::application::comments::CommentService;
use plaza::application::communities::CommunityService;
use plaza::application::engine::Engine;
use plaza::application::posts::PostService;
use plaza::application::repos::{
    CommentsRepo, CommunitiesRepo, CreateCommentParams, CreatePostParams, PostsRepo,
    PostsWriteRepo, RepoError, Repositories, UpdatePostParams, UsersRepo,
};
use plaza::cache::{Batch, CacheConfig, FastStore, MemoryStore, Reply, StoreError};
use plaza::domain::entities::{
    CommentRecord, CommunityRecord, PostRecord, RankSeed, UserRecord,
};
use plaza::domain::ids::IdGenerator;
use plaza::domain::types::{CommentId, CommunityId, PostId, PostOrder, UserId};
use plaza::ranking::RankingConfig;
use plaza::util::clock::{Clock, ManualClock};
use plaza_api_types::CreatePostRequest;
use time::OffsetDateTime;
use time::macros::datetime;

pub const ALICE: UserId = UserId(1);
pub const BOB: UserId = UserId(2);
pub const RUST: CommunityId = CommunityId(1);
pub const GO: CommunityId = CommunityId(2);

pub fn start_time() -> OffsetDateTime {
    datetime!(2024-05-01 12:00 UTC)
}

#[derive(Default)]
pub struct MemoryRepos {
    posts: Mutex<BTreeMap<PostId, PostRecord>>,
    users: Mutex<HashMap<UserId, UserRecord>>,
    communities: Mutex<HashMap<CommunityId, CommunityRecord>>,
    comments: Mutex<BTreeMap<CommentId, CommentRecord>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    fail_bulk_update: AtomicBool,
}

impl MemoryRepos {
    pub fn seeded() -> Self {
        let repos = Self::default();
        repos.insert_user(ALICE, "alice");
        repos.insert_user(BOB, "bob");
        repos.insert_community(RUST, "rust");
        repos.insert_community(GO, "go");
        repos
    }

    pub fn insert_user(&self, id: UserId, name: &str) {
        self.users.lock().expect("users").insert(
            id,
            UserRecord {
                id,
                username: name.to_string(),
            },
        );
    }

    pub fn insert_community(&self, id: CommunityId, name: &str) {
        self.communities.lock().expect("communities").insert(
            id,
            CommunityRecord {
                id,
                name: name.to_string(),
                introduction: format!("all about {name}"),
                created_at: datetime!(2024-01-01 00:00 UTC),
            },
        );
    }

    /// Insert a row directly, bypassing the service.
    pub fn insert_post(&self, record: PostRecord) {
        self.posts
            .lock()
            .expect("posts")
            .insert(record.id, record);
    }

    pub fn post(&self, id: PostId) -> Option<PostRecord> {
        self.posts.lock().expect("posts").get(&id).cloned()
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls")
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn fail_bulk_update(&self, fail: bool) {
        self.fail_bulk_update.store(fail, Ordering::SeqCst);
    }

    fn record(&self, name: &'static str) {
        *self.calls.lock().expect("calls").entry(name).or_default() += 1;
    }
}

#[async_trait]
impl PostsRepo for MemoryRepos {
    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError> {
        self.record("find_post");
        Ok(self.post(id))
    }

    async fn find_post_author(&self, id: PostId) -> Result<Option<UserId>, RepoError> {
        self.record("find_post_author");
        Ok(self.post(id).map(|post| post.author_id))
    }

    async fn list_posts_by_ids(&self, ids: &[PostId]) -> Result<Vec<PostRecord>, RepoError> {
        self.record("list_posts_by_ids");
        let posts = self.posts.lock().expect("posts");
        Ok(ids.iter().filter_map(|id| posts.get(id).cloned()).collect())
    }

    async fn list_posts_by_order(
        &self,
        order: PostOrder,
        community: Option<CommunityId>,
        page: u32,
        size: u32,
    ) -> Result<Vec<PostRecord>, RepoError> {
        self.record("list_posts_by_order");
        let mut posts: Vec<PostRecord> = self
            .posts
            .lock()
            .expect("posts")
            .values()
            .filter(|post| community.is_none_or(|community| post.community_id == community))
            .cloned()
            .collect();
        match order {
            PostOrder::Time => posts.sort_by(|a, b| {
                (b.created_at, b.id).cmp(&(a.created_at, a.id))
            }),
            PostOrder::View => posts.sort_by(|a, b| {
                (b.view_count, b.created_at, b.id).cmp(&(a.view_count, a.created_at, a.id))
            }),
            PostOrder::Score => {
                return Err(RepoError::InvalidInput {
                    message: "score order is only served by the ranking index".to_string(),
                });
            }
        }
        let skip = (page.saturating_sub(1) * size) as usize;
        Ok(posts.into_iter().skip(skip).take(size as usize).collect())
    }

    async fn list_rank_seeds(&self) -> Result<Vec<RankSeed>, RepoError> {
        self.record("list_rank_seeds");
        Ok(self
            .posts
            .lock()
            .expect("posts")
            .values()
            .map(RankSeed::from)
            .collect())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepos {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.record("create_post");
        let record = PostRecord {
            id: params.id,
            author_id: params.author_id,
            community_id: params.community_id,
            title: params.title,
            content: params.content,
            view_count: 0,
            created_at: params.created_at,
            updated_at: params.created_at,
        };
        let mut posts = self.posts.lock().expect("posts");
        if posts.contains_key(&record.id) {
            return Err(RepoError::Duplicate {
                constraint: "posts_pkey".to_string(),
            });
        }
        posts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        self.record("update_post");
        let mut posts = self.posts.lock().expect("posts");
        let post = posts.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        if let Some(title) = params.title {
            post.title = title;
        }
        if let Some(content) = params.content {
            post.content = content;
        }
        if let Some(community) = params.community_id {
            post.community_id = community;
        }
        post.updated_at = params.updated_at;
        Ok(post.clone())
    }

    async fn bulk_update_view_counts(&self, counts: &[(PostId, i64)]) -> Result<u64, RepoError> {
        self.record("bulk_update_view_counts");
        if self.fail_bulk_update.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let mut posts = self.posts.lock().expect("posts");
        let mut touched = 0;
        for (id, views) in counts {
            if let Some(post) = posts.get_mut(id) {
                post.view_count = post.view_count.max(*views);
                touched += 1;
            }
        }
        Ok(touched)
    }
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn find_user(&self, id: UserId) -> Result<Option<UserRecord>, RepoError> {
        self.record("find_user");
        Ok(self.users.lock().expect("users").get(&id).cloned())
    }
}

#[async_trait]
impl CommunitiesRepo for MemoryRepos {
    async fn find_community(&self, id: CommunityId) -> Result<Option<CommunityRecord>, RepoError> {
        self.record("find_community");
        Ok(self.communities.lock().expect("communities").get(&id).cloned())
    }

    async fn list_communities(&self) -> Result<Vec<CommunityRecord>, RepoError> {
        self.record("list_communities");
        let mut communities: Vec<CommunityRecord> = self
            .communities
            .lock()
            .expect("communities")
            .values()
            .cloned()
            .collect();
        communities.sort_by_key(|community| community.id);
        Ok(communities)
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepos {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        self.record("create_comment");
        let record = CommentRecord {
            id: params.id,
            post_id: params.post_id,
            author_id: params.author_id,
            parent_id: params.parent_id,
            content: params.content,
            created_at: params.created_at,
        };
        let mut comments = self.comments.lock().expect("comments");
        if comments.contains_key(&record.id) {
            return Err(RepoError::Duplicate {
                constraint: "comments_pkey".to_string(),
            });
        }
        comments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_comment(&self, id: CommentId) -> Result<Option<CommentRecord>, RepoError> {
        self.record("find_comment");
        Ok(self.comments.lock().expect("comments").get(&id).cloned())
    }

    async fn list_comments_by_post(
        &self,
        post: PostId,
        page: u32,
        size: u32,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        self.record("list_comments_by_post");
        let mut comments: Vec<CommentRecord> = self
            .comments
            .lock()
            .expect("comments")
            .values()
            .filter(|comment| comment.post_id == post)
            .cloned()
            .collect();
        comments.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        let skip = (page.saturating_sub(1) * size) as usize;
        Ok(comments.into_iter().skip(skip).take(size as usize).collect())
    }
}

/// Fast store wrapper that fails every call while switched off.
pub struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::default(),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("injected outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl FastStore for FlakyStore {
    async fn exec(&self, batch: Batch) -> Result<Vec<Reply>, StoreError> {
        self.check()?;
        self.inner.exec(batch).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        self.inner.scan_prefix(prefix).await
    }
}

pub struct Harness {
    pub repos: Arc<MemoryRepos>,
    pub store: Arc<FlakyStore>,
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub service: PostService,
    pub communities: CommunityService,
    pub comments: CommentService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_configs(CacheConfig::default(), RankingConfig::default())
    }

    pub fn with_configs(cache: CacheConfig, ranking: RankingConfig) -> Self {
        Self::with_repos(MemoryRepos::seeded(), cache, ranking)
    }

    pub fn with_repos(repos: MemoryRepos, cache: CacheConfig, ranking: RankingConfig) -> Self {
        let repos = Arc::new(repos);
        let store = Arc::new(FlakyStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let engine = Engine::new(store.clone(), cache, ranking, dyn_clock.clone());
        let ids = Arc::new(
            IdGenerator::new(datetime!(2024-01-01 00:00 UTC), 1, dyn_clock.clone())
                .expect("id generator"),
        );
        let repositories = Repositories::from_shared(repos.clone());
        let communities = CommunityService::new(repositories.communities.clone());
        let comments = CommentService::new(
            repositories.comments.clone(),
            repositories.posts.clone(),
            ids.clone(),
            dyn_clock.clone(),
        );
        let service = PostService::new(repositories, engine.clone(), ids, dyn_clock);

        Self {
            repos,
            store,
            engine,
            clock,
            service,
            communities,
            comments,
        }
    }

    pub async fn create(&self, author: UserId, community: CommunityId, title: &str) -> PostRecord {
        self.service
            .create_post(
                author,
                CreatePostRequest {
                    community_id: community.get(),
                    title: title.to_string(),
                    content: format!("{title} body"),
                },
            )
            .await
            .expect("create post")
    }

    /// Wait for background cache writes, delayed deletes and index updates.
    pub async fn settle(&self) {
        self.engine.deferred.drain().await;
    }

    pub async fn score(&self, post: PostId) -> f64 {
        self.engine
            .ranking
            .score(post)
            .await
            .expect("score")
            .expect("indexed")
    }

    pub async fn view_rank(&self, post: PostId) -> Option<f64> {
        self.engine
            .store
            .zscore(&self.engine.keys.rank(PostOrder::View), &post.to_string())
            .await
            .expect("view rank")
    }
}
