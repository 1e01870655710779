mod common;

use std::time::Duration;

use common::{ALICE, BOB, GO, Harness, RUST};
use plaza::application::error::AppError;
use plaza::domain::types::{PostId, PostOrder, UserId, VoteDirection};
use plaza_api_types::{PostListQuery, VoteRequest};

fn vote(post: PostId, direction: VoteDirection) -> VoteRequest {
    VoteRequest {
        post_id: post.get(),
        direction,
    }
}

#[tokio::test]
async fn vote_sequence_moves_score_by_the_direction_change() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "hello").await;

    h.service
        .vote(BOB, vote(post.id, VoteDirection::Up))
        .await
        .expect("up");
    assert_eq!(h.score(post.id).await, 432.0);

    let repeat = h.service.vote(BOB, vote(post.id, VoteDirection::Up)).await;
    assert!(matches!(repeat, Err(AppError::DuplicateVote)));
    assert_eq!(h.score(post.id).await, 432.0);

    let down = h
        .service
        .vote(BOB, vote(post.id, VoteDirection::Down))
        .await
        .expect("down");
    assert_eq!(down.delta, -864.0);
    assert_eq!(h.score(post.id).await, -432.0);

    h.service
        .vote(BOB, vote(post.id, VoteDirection::Retract))
        .await
        .expect("retract");
    assert_eq!(h.score(post.id).await, 0.0);
}

#[tokio::test]
async fn votes_from_different_users_accumulate() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "popular").await;

    for user in 10..15 {
        h.service
            .vote(UserId(user), vote(post.id, VoteDirection::Up))
            .await
            .expect("vote");
    }
    h.service
        .vote(UserId(20), vote(post.id, VoteDirection::Down))
        .await
        .expect("vote");

    assert_eq!(h.score(post.id).await, 4.0 * 432.0);
    let detail = h.service.get_post(post.id, None).await.expect("read");
    assert_eq!(detail.vote_count, 5);
}

#[tokio::test]
async fn voting_closes_once_the_window_elapses() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "old news").await;

    h.clock.advance(Duration::from_secs(7 * 24 * 3600 - 60));
    h.service
        .vote(BOB, vote(post.id, VoteDirection::Up))
        .await
        .expect("inside window");

    h.clock.advance(Duration::from_secs(120));
    let late = h
        .service
        .vote(UserId(3), vote(post.id, VoteDirection::Up))
        .await;
    assert!(matches!(late, Err(AppError::VoteWindowExpired)));
    assert_eq!(h.score(post.id).await, 432.0);
}

#[tokio::test]
async fn voting_on_an_unknown_post_is_not_found() {
    let h = Harness::new();
    let result = h
        .service
        .vote(BOB, vote(PostId(12345), VoteDirection::Up))
        .await;
    assert!(matches!(result, Err(AppError::NotFound { entity: "post" })));
}

#[tokio::test]
async fn score_listing_orders_by_net_votes() {
    let h = Harness::new();
    let liked = h.create(ALICE, RUST, "liked").await;
    h.clock.advance(Duration::from_secs(1));
    let ignored = h.create(ALICE, RUST, "ignored").await;
    h.clock.advance(Duration::from_secs(1));
    let disliked = h.create(BOB, GO, "disliked").await;

    h.service
        .vote(BOB, vote(liked.id, VoteDirection::Up))
        .await
        .expect("up");
    h.service
        .vote(ALICE, vote(disliked.id, VoteDirection::Down))
        .await
        .expect("down");

    let page = h
        .service
        .get_post_list(&PostListQuery {
            order: PostOrder::Score,
            ..PostListQuery::default()
        })
        .await
        .expect("list");
    let ids: Vec<PostId> = page.iter().map(|detail| detail.post.id).collect();
    assert_eq!(ids, vec![liked.id, ignored.id, disliked.id]);
    assert_eq!(page[0].vote_count, 1);
    assert_eq!(page[2].vote_count, 0);
}

#[tokio::test]
async fn community_score_listing_only_contains_members() {
    let h = Harness::new();
    let rust = h.create(ALICE, RUST, "borrowck").await;
    h.clock.advance(Duration::from_secs(1));
    let go = h.create(ALICE, GO, "goroutines").await;

    h.service
        .vote(BOB, vote(go.id, VoteDirection::Up))
        .await
        .expect("up");

    let page = h
        .service
        .get_post_list(&PostListQuery {
            community_id: RUST.get(),
            order: PostOrder::Score,
            ..PostListQuery::default()
        })
        .await
        .expect("list");
    let ids: Vec<PostId> = page.iter().map(|detail| detail.post.id).collect();
    assert_eq!(ids, vec![rust.id]);
    assert_eq!(page[0].community.name, "rust");
}

#[tokio::test]
async fn voting_fails_fast_while_the_fast_store_is_down() {
    let h = Harness::new();
    let post = h.create(ALICE, RUST, "outage").await;

    h.store.set_down(true);
    let err = h
        .service
        .vote(BOB, vote(post.id, VoteDirection::Up))
        .await
        .expect_err("store down");
    assert!(err.is_transient());

    h.store.set_down(false);
    assert_eq!(h.score(post.id).await, 0.0);
}
