mod common;

use std::time::Duration;

use common::{ALICE, BOB, GO, Harness, MemoryRepos, RUST, start_time};
use plaza::application::jobs::{ReconciliationService, warm_up};
use plaza::cache::{CacheConfig, FastStore};
use plaza::domain::entities::PostRecord;
use plaza::domain::types::{PostId, PostOrder};
use plaza::ranking::RankingConfig;
use plaza_api_types::PostListQuery;

fn reconciler(h: &Harness) -> ReconciliationService {
    ReconciliationService::new(&h.engine, h.repos.clone())
}

async fn read_times(h: &Harness, post: PostId, times: usize) {
    for _ in 0..times {
        h.service.get_post(post, None).await.expect("read");
    }
}

#[tokio::test]
async fn pass_persists_counters_and_rebuilds_the_view_index() {
    let h = Harness::new();
    let a = h.create(ALICE, RUST, "a").await;
    let b = h.create(BOB, GO, "b").await;
    read_times(&h, a.id, 4).await;
    read_times(&h, b.id, 2).await;
    h.settle().await;

    // A propagation that never landed.
    h.engine.ranking.set_view_rank(a.id, 0).await.expect("rank");

    let summary = reconciler(&h).run_once().await.expect("pass");
    assert_eq!(summary.counters, 2);
    assert!(summary.persisted);
    assert!(summary.index_rebuilt);

    assert_eq!(h.repos.post(a.id).expect("a").view_count, 4);
    assert_eq!(h.repos.post(b.id).expect("b").view_count, 2);
    assert_eq!(h.view_rank(a.id).await, Some(4.0));
}

#[tokio::test]
async fn view_index_rebuild_skips_the_durable_store() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "drifted").await;
    read_times(&h, post.id, 7).await;
    h.settle().await;
    h.engine.ranking.set_view_rank(post.id, 2).await.expect("rank");

    let ranked = reconciler(&h).rebuild_view_index().await.expect("rebuild");
    assert_eq!(ranked, 1);
    assert_eq!(h.view_rank(post.id).await, Some(7.0));
    assert_eq!(h.repos.calls("bulk_update_view_counts"), 0);
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 0);
}

/// Read `post` `times` times with the cache warm after the first read, then
/// persist the live counter.
async fn reconciled_reads(h: &Harness, post: PostId, times: usize) {
    h.service.get_post(post, None).await.expect("first read");
    h.settle().await;
    read_times(h, post, times - 1).await;
    reconciler(h).run_once().await.expect("pass");
    assert_eq!(h.repos.post(post).expect("row").view_count, times as i64);
}

async fn lose_counter(h: &Harness, post: PostId) {
    let removed = h
        .engine
        .store
        .del(vec![h.engine.keys.views(post)])
        .await
        .expect("delete counter");
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn lost_counter_on_a_cached_read_resumes_from_the_durable_snapshot() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "evicted").await;
    reconciled_reads(&h, post.id, 50).await;
    lose_counter(&h, post.id).await;

    let detail = h.service.get_post(post.id, None).await.expect("cached read");
    assert_eq!(detail.view_count, 51);
    // Only the lost counter sent the read to the durable store.
    assert_eq!(h.repos.calls("find_post"), 2);

    h.settle().await;
    reconciler(&h).run_once().await.expect("second pass");
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 51);
    assert_eq!(h.view_rank(post.id).await, Some(51.0));
}

#[tokio::test]
async fn lost_counter_on_an_uncached_read_resumes_from_the_durable_snapshot() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "cold").await;
    reconciled_reads(&h, post.id, 50).await;
    lose_counter(&h, post.id).await;
    h.service.clear_post_cache(post.id).await.expect("clear");

    let detail = h.service.get_post(post.id, None).await.expect("durable read");
    assert_eq!(detail.view_count, 51);

    h.settle().await;
    reconciler(&h).run_once().await.expect("second pass");
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 51);
}

#[tokio::test]
async fn lost_counter_with_a_live_viewer_marker_keeps_the_durable_count() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "marked").await;
    h.service.get_post(post.id, Some(BOB)).await.expect("signed-in read");
    h.settle().await;
    read_times(&h, post.id, 9).await;
    reconciler(&h).run_once().await.expect("pass");
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 10);

    lose_counter(&h, post.id).await;
    let detail = h
        .service
        .get_post(post.id, Some(BOB))
        .await
        .expect("repeat read");
    assert_eq!(detail.view_count, 10);

    reconciler(&h).run_once().await.expect("second pass");
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 10);
}

#[tokio::test]
async fn pass_without_counters_succeeds_without_writing() {
    let h = Harness::new();
    let summary = reconciler(&h).run_once().await.expect("pass");
    assert_eq!(summary.counters, 0);
    assert!(summary.index_rebuilt);
    assert_eq!(h.repos.calls("bulk_update_view_counts"), 0);
}

#[tokio::test]
async fn failed_persist_leaves_the_view_index_alone() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "flaky").await;
    read_times(&h, post.id, 3).await;
    h.settle().await;
    h.engine.ranking.set_view_rank(post.id, 1).await.expect("rank");

    h.repos.fail_bulk_update(true);
    let err = reconciler(&h).run_once().await.expect_err("persist fails");
    assert!(err.is_transient());
    assert_eq!(h.view_rank(post.id).await, Some(1.0));
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 0);

    h.repos.fail_bulk_update(false);
    let summary = reconciler(&h).trigger_manual().await.expect("retry");
    assert_eq!(summary.counters, 1);
    assert_eq!(h.view_rank(post.id).await, Some(3.0));
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 3);
}

#[tokio::test]
async fn fast_store_outage_fails_the_pass() {
    let h = Harness::new();
    h.store.set_down(true);
    let err = reconciler(&h).run_once().await.expect_err("store down");
    assert_eq!(err.kind(), "transient_store");
}

#[tokio::test(start_paused = true)]
async fn periodic_loop_runs_after_each_interval() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "ticking").await;
    read_times(&h, post.id, 5).await;

    let handle = reconciler(&h).spawn_periodic(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 0);

    for _ in 0..10 {
        tokio::time::sleep(Duration::from_secs(31)).await;
        if h.repos.post(post.id).expect("row").view_count == 5 {
            break;
        }
    }
    assert_eq!(h.repos.post(post.id).expect("row").view_count, 5);
    handle.abort();
}

#[tokio::test]
async fn warm_up_rebuilds_rankings_from_durable_rows() {
    let repos = MemoryRepos::seeded();
    for (id, views, minutes) in [(1, 10, 0), (2, 30, 1), (3, 20, 2)] {
        repos.insert_post(PostRecord {
            id: PostId(id),
            author_id: ALICE,
            community_id: if id == 2 { GO } else { RUST },
            title: format!("post {id}"),
            content: "body".to_string(),
            view_count: views,
            created_at: start_time() - time::Duration::minutes(10 - minutes),
            updated_at: start_time(),
        });
    }
    let h = Harness::with_repos(repos, CacheConfig::default(), RankingConfig::default());

    let summary = warm_up(&*h.repos, &h.engine).await.expect("warm");
    assert_eq!(summary.posts, 3);
    assert_eq!(summary.counters_seeded, 3);
    assert_eq!(summary.authors_recorded, 3);

    let by_views = h
        .service
        .get_post_list(&PostListQuery {
            order: PostOrder::View,
            ..PostListQuery::default()
        })
        .await
        .expect("list");
    let ids: Vec<PostId> = by_views.iter().map(|detail| detail.post.id).collect();
    assert_eq!(ids, vec![PostId(2), PostId(3), PostId(1)]);

    let rust = h
        .service
        .get_post_list(&PostListQuery {
            community_id: RUST.get(),
            ..PostListQuery::default()
        })
        .await
        .expect("list");
    let ids: Vec<PostId> = rust.iter().map(|detail| detail.post.id).collect();
    assert_eq!(ids, vec![PostId(3), PostId(1)]);

    let detail = h.service.get_post(PostId(1), None).await.expect("read");
    assert_eq!(detail.view_count, 11);
    assert_eq!(h.repos.calls("find_post_author"), 0);

    // Warming again leaves live state alone.
    let again = warm_up(&*h.repos, &h.engine).await.expect("rewarm");
    assert_eq!(again.counters_seeded, 0);
    assert_eq!(h.engine.views.current(PostId(1)).await.expect("count"), 11);
}
