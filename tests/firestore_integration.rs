// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running.
//! Run with `FIRESTORE_EMULATOR_HOST` pointing at a local emulator.
//!
//! Every test uses fresh UUIDs so runs do not interfere.

use futures_util::future::join_all;
use matchify::db::Store;
use matchify::models::{
    Conversation, DeliveryState, DiscoverySection, Edge, EdgeKind, Limit, Message, MeteredAction,
    Plan, PlanName,
};

mod common;
use common::{test_db, test_user};

// ═══════════════════════════════════════════════════════════════════════════
// USER TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_user_round_trip() {
    require_emulator!();

    let db = test_db().await;
    let mut user = test_user("Ana");
    user.interests = vec!["climbing".to_string()];

    assert!(db.get_user(&user.id).await.unwrap().is_none());
    db.upsert_user(&user).await.unwrap();

    let stored = db.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.name, "Ana");
    assert_eq!(stored.interests, vec!["climbing".to_string()]);
    assert_eq!(stored.plan, PlanName::Free);
}

#[tokio::test]
async fn test_reserve_usage_respects_limit() {
    require_emulator!();

    let db = test_db().await;
    let user = test_user("Ben");
    db.upsert_user(&user).await.unwrap();

    let limit = Limit::Daily(2);
    assert!(db.reserve_usage(&user.id, MeteredAction::Like, limit).await.unwrap());
    assert!(db.reserve_usage(&user.id, MeteredAction::Like, limit).await.unwrap());
    assert!(!db.reserve_usage(&user.id, MeteredAction::Like, limit).await.unwrap());

    let stored = db.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.usage.used(MeteredAction::Like), 2);
}

#[tokio::test]
async fn test_shown_ids_are_not_duplicated() {
    require_emulator!();

    let db = test_db().await;
    let user = test_user("Cleo");
    db.upsert_user(&user).await.unwrap();

    let ids = vec!["x".to_string(), "y".to_string()];
    db.add_shown(&user.id, DiscoverySection::Recommended, &ids)
        .await
        .unwrap();
    db.add_shown(&user.id, DiscoverySection::Recommended, &ids[..1])
        .await
        .unwrap();

    let stored = db.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.shown.get(DiscoverySection::Recommended), &ids[..]);
}

// ═══════════════════════════════════════════════════════════════════════════
// PLAN AND EDGE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_plan_upsert_and_get() {
    require_emulator!();

    let db = test_db().await;
    let mut plan = Plan::default_catalog()
        .into_iter()
        .find(|p| p.name == PlanName::Premium)
        .unwrap();
    plan.description = "Everything".to_string();

    db.upsert_plan(&plan).await.unwrap();
    let stored = db.get_plan(PlanName::Premium).await.unwrap().unwrap();
    assert_eq!(stored.daily_likes_limit, Limit::Unlimited);
    assert_eq!(stored.description, "Everything");
}

#[tokio::test]
async fn test_edge_insert_is_unique_per_pair() {
    require_emulator!();

    let db = test_db().await;
    let a = test_user("A");
    let b = test_user("B");

    assert!(db
        .insert_edge(EdgeKind::Like, &Edge::new(&a.id, &b.id))
        .await
        .unwrap());
    assert!(!db
        .insert_edge(EdgeKind::Like, &Edge::new(&a.id, &b.id))
        .await
        .unwrap());
    assert!(db.edge_exists(EdgeKind::Like, &a.id, &b.id).await.unwrap());
    assert!(!db.edge_exists(EdgeKind::Block, &a.id, &b.id).await.unwrap());

    let incoming = db.edges_to(EdgeKind::Like, &b.id).await.unwrap();
    assert_eq!(incoming.len(), 1);

    assert!(db.delete_edge(EdgeKind::Like, &a.id, &b.id).await.unwrap());
    assert!(!db.delete_edge(EdgeKind::Like, &a.id, &b.id).await.unwrap());
}

// ═══════════════════════════════════════════════════════════════════════════
// CONVERSATION TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_conversation_delivery_and_read() {
    require_emulator!();

    let db = test_db().await;
    let a = test_user("A");
    let b = test_user("B");

    let first = Message::new(&a.id, "one");
    let second = Message::new(&a.id, "two");
    db.append_message(&a.id, &b.id, &first).await.unwrap();
    db.append_message(&a.id, &b.id, &second).await.unwrap();

    let id = Conversation::id_for(&a.id, &b.id);
    assert!(db.mark_delivered(&id, &first.id).await.unwrap());
    assert!(!db.mark_delivered(&id, &first.id).await.unwrap());

    let pending = db.deliver_pending(&id, &b.id).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, second.id);

    let read = db.mark_read(&id, &b.id).await.unwrap().unwrap();
    assert_eq!(read.len(), 2);

    let conversation = db.get_conversation(&id).await.unwrap().unwrap();
    assert!(conversation
        .messages
        .iter()
        .all(|m| m.state() == DeliveryState::Read));

    let listed = db.conversations_for(&b.id).await.unwrap();
    assert_eq!(listed.len(), 1);

    assert!(db.mark_read("missing_pair", &b.id).await.unwrap().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// CONCURRENT WRITE TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_reads_racing_appends_lose_no_messages() {
    require_emulator!();

    let db = test_db().await;
    let a = test_user("A");
    let b = test_user("B");
    let id = Conversation::id_for(&a.id, &b.id);
    db.append_message(&a.id, &b.id, &Message::new(&a.id, "first"))
        .await
        .unwrap();

    let appends = (0..8).map(|i| {
        let db = db.clone();
        let (a, b) = (a.id.clone(), b.id.clone());
        tokio::spawn(async move {
            let message = Message::new(&a, &format!("m{}", i));
            db.append_message(&a, &b, &message).await
        })
    });
    let reads = (0..8).map(|_| {
        let db = db.clone();
        let (id, b) = (id.clone(), b.id.clone());
        tokio::spawn(async move { db.mark_read(&id, &b).await.map(|_| ()) })
    });

    for result in join_all(appends.chain(reads)).await {
        result.unwrap().unwrap();
    }

    let conversation = db.get_conversation(&id).await.unwrap().unwrap();
    assert_eq!(conversation.messages.len(), 9);
}

#[tokio::test]
async fn test_usage_writes_keep_plan_changes() {
    require_emulator!();

    let db = test_db().await;
    let user = test_user("Dee");
    db.upsert_user(&user).await.unwrap();

    let expiry = chrono::Utc::now() + chrono::Duration::days(30);
    let (upgraded, reserved) = tokio::join!(
        db.set_user_plan(&user.id, PlanName::Premium, Some(expiry)),
        db.reserve_usage(&user.id, MeteredAction::Like, Limit::Daily(5)),
    );
    upgraded.unwrap();
    assert!(reserved.unwrap());

    db.add_shown(&user.id, DiscoverySection::Recommended, &["x".to_string()])
        .await
        .unwrap();
    assert!(db.reset_all_usage().await.unwrap() >= 1);

    let stored = db.get_user(&user.id).await.unwrap().unwrap();
    assert_eq!(stored.plan, PlanName::Premium);
    assert!(stored.plan_expiry.is_some());
    assert!(stored.usage.is_zero());
    assert_eq!(stored.shown.get(DiscoverySection::Recommended), ["x".to_string()]);
}

#[tokio::test]
async fn test_second_read_changes_nothing() {
    require_emulator!();

    let db = test_db().await;
    let a = test_user("A");
    let b = test_user("B");
    let id = Conversation::id_for(&a.id, &b.id);
    db.append_message(&a.id, &b.id, &Message::new(&a.id, "hi"))
        .await
        .unwrap();

    assert_eq!(db.mark_read(&id, &b.id).await.unwrap().unwrap().len(), 1);
    let before = db.get_conversation(&id).await.unwrap().unwrap();

    assert!(db.mark_read(&id, &b.id).await.unwrap().unwrap().is_empty());
    let after = db.get_conversation(&id).await.unwrap().unwrap();
    assert_eq!(before.updated_at, after.updated_at);
    assert!(!db.mark_delivered(&id, &before.messages[0].id).await.unwrap());
}
