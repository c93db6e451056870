// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Likes, blocks, reports and the mutual-like gate.

use matchify::error::{AppError, ForbiddenReason};
use matchify::models::{EdgeKind, MeteredAction};
use matchify::services::ServerEvent;

mod common;

#[tokio::test]
async fn test_repeat_like_creates_nothing_and_costs_nothing() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;
    let b = common::seed_user(&state, "Ben").await;

    let first = state.social.perform_like(&a, &b).await.unwrap();
    assert!(first.created);
    assert!(!first.mutual);

    let second = state.social.perform_like(&a, &b).await.unwrap();
    assert!(!second.created);

    let likes = state.db.edges_from(EdgeKind::Like, &a).await.unwrap();
    assert_eq!(likes.len(), 1);

    let user = state.db.get_user(&a).await.unwrap().unwrap();
    assert_eq!(user.usage.used(MeteredAction::Like), 1);
}

#[tokio::test]
async fn test_like_back_is_mutual_and_notifies_both() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;
    let b = common::seed_user(&state, "Ben").await;
    let (_ha, mut rx_a) = common::connect(&state, &a);
    let (_hb, mut rx_b) = common::connect(&state, &b);

    state.social.perform_like(&a, &b).await.unwrap();
    let events = common::drain(&mut rx_b);
    assert_eq!(
        events,
        vec![ServerEvent::LikedByUser {
            user_id: a.clone(),
            name: "Ana".to_string()
        }]
    );

    let outcome = state.social.perform_like(&b, &a).await.unwrap();
    assert!(outcome.mutual);
    assert!(state.social.can_chat(&a, &b).await.unwrap());
    assert!(state.social.can_chat(&b, &a).await.unwrap());

    let events = common::drain(&mut rx_a);
    assert!(events.contains(&ServerEvent::MutualLike { user_id: b.clone() }));
    let events = common::drain(&mut rx_b);
    assert!(events.contains(&ServerEvent::MutualLike { user_id: a.clone() }));
}

#[tokio::test]
async fn test_self_like_is_forbidden() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;

    let err = state.social.perform_like(&a, &a).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Forbidden(ForbiddenReason::SelfAction)
    ));
}

#[tokio::test]
async fn test_like_rejects_malformed_and_unknown_targets() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;

    assert!(matches!(
        state.social.perform_like(&a, "not-a-uuid").await,
        Err(AppError::BadRequest(_))
    ));
    let ghost = uuid::Uuid::new_v4().to_string();
    assert!(matches!(
        state.social.perform_like(&a, &ghost).await,
        Err(AppError::NotFound(_))
    ));

    // Failed attempts did not consume quota
    let user = state.db.get_user(&a).await.unwrap().unwrap();
    assert_eq!(user.usage.used(MeteredAction::Like), 0);
}

#[tokio::test]
async fn test_like_quota_blocks_new_likes_only() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;
    let mut targets = Vec::new();
    for i in 0..6 {
        targets.push(common::seed_user(&state, &format!("T{}", i)).await);
    }

    for target in &targets[..5] {
        state.social.perform_like(&a, target).await.unwrap();
    }
    let err = state.social.perform_like(&a, &targets[5]).await.unwrap_err();
    assert_eq!(err.code(), "quota_exceeded");

    // Repeating an existing like is still a success
    let repeat = state.social.perform_like(&a, &targets[0]).await.unwrap();
    assert!(!repeat.created);
}

#[tokio::test]
async fn test_unlike_breaks_the_gate() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;
    let b = common::seed_user(&state, "Ben").await;
    common::make_mutual(&state, &a, &b).await;
    let (_hb, mut rx_b) = common::connect(&state, &b);

    assert!(state.social.unlike(&a, &b).await.unwrap());
    assert!(!state.social.unlike(&a, &b).await.unwrap());
    assert!(!state.social.can_chat(&a, &b).await.unwrap());

    assert_eq!(
        common::drain(&mut rx_b),
        vec![ServerEvent::UserUnliked { user_id: a.clone() }]
    );
}

#[tokio::test]
async fn test_block_and_dislike_are_idempotent() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;
    let b = common::seed_user(&state, "Ben").await;

    assert!(state.social.block(&a, &b).await.unwrap().created);
    assert!(!state.social.block(&a, &b).await.unwrap().created);
    assert!(state.social.dislike(&a, &b).await.unwrap().created);
    assert!(!state.social.dislike(&a, &b).await.unwrap().created);
}

#[tokio::test]
async fn test_report_removes_likes_both_ways() {
    let state = common::test_state().await;
    let a = common::seed_user(&state, "Ana").await;
    let b = common::seed_user(&state, "Ben").await;
    common::make_mutual(&state, &a, &b).await;

    let outcome = state
        .social
        .report_user(&a, &b, "spam", Some("Sends links".to_string()))
        .await
        .unwrap();
    assert!(outcome.created);
    assert!(!state.social.can_chat(&a, &b).await.unwrap());

    // Neither side can message the other afterwards
    for (from, to) in [(&a, &b), (&b, &a)] {
        assert!(matches!(
            state.chat.send_message(from, to, "still there?").await,
            Err(AppError::Forbidden(ForbiddenReason::MutualLikeRequired))
        ));
    }

    // Same reason again is a no-op; a different reason is a new report
    assert!(!state.social.report_user(&a, &b, "spam", None).await.unwrap().created);
    assert!(state.social.report_user(&a, &b, "scam", None).await.unwrap().created);

    assert!(matches!(
        state.social.report_user(&a, &b, "rude", None).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_who_liked_me_lists_one_sided_likes_and_is_metered() {
    let state = common::test_state().await;
    let me = common::seed_user(&state, "Me").await;
    let admirer = common::seed_user(&state, "Admirer").await;
    let matched = common::seed_user(&state, "Match").await;

    state.social.perform_like(&admirer, &me).await.unwrap();
    common::make_mutual(&state, &me, &matched).await;

    let cards = state.social.who_liked_me(&me).await.unwrap();
    let ids: Vec<&str> = cards.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec![admirer.as_str()]);

    let mutual = state.social.mutual_likes(&me).await.unwrap();
    assert_eq!(mutual.len(), 1);
    assert_eq!(mutual[0].id, matched);

    // FREE allows two views a day
    state.social.who_liked_me(&me).await.unwrap();
    assert_eq!(
        state.social.who_liked_me(&me).await.unwrap_err().code(),
        "quota_exceeded"
    );
}
