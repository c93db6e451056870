// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use matchify::config::Config;
use matchify::db::{FirestoreDb, MemoryDb, Store};
use matchify::middleware::auth::create_jwt;
use matchify::models::{EdgeKind, Edge, PlanName, User};
use matchify::routes::create_router;
use matchify::services::ConnectionHandle;
use matchify::services::ServerEvent;
use matchify::AppState;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// State over an in-memory store with the default plan catalog.
#[allow(dead_code)]
pub async fn test_state() -> Arc<AppState> {
    let db: Arc<dyn Store> = Arc::new(MemoryDb::new());
    let state = Arc::new(AppState::new(Config::test_default(), db));
    state
        .entitlements
        .seed_default_plans()
        .await
        .expect("seed plans");
    state
}

/// Create a test app over the in-memory store.
/// Returns the router and the shared state.
#[allow(dead_code)]
pub async fn create_test_app() -> (axum::Router, Arc<AppState>) {
    let state = test_state().await;
    (create_router(state.clone()), state)
}

/// Session token for `user_id` signed with the test key.
#[allow(dead_code)]
pub fn token_for(user_id: &str) -> String {
    create_jwt(user_id, &Config::test_default().jwt_signing_key).expect("sign token")
}

/// Verified user with a fresh UUID.
#[allow(dead_code)]
pub fn test_user(name: &str) -> User {
    let mut user = User::new(uuid::Uuid::new_v4().to_string(), name);
    user.is_verified = true;
    user
}

/// Insert a verified user and return its ID.
#[allow(dead_code)]
pub async fn seed_user(state: &AppState, name: &str) -> String {
    let user = test_user(name);
    state.db.upsert_user(&user).await.expect("insert user");
    user.id
}

/// Insert a user on `plan` and return its ID.
#[allow(dead_code)]
pub async fn seed_user_on_plan(state: &AppState, name: &str, plan: PlanName) -> String {
    let mut user = test_user(name);
    user.plan = plan;
    user.plan_expiry = Some(chrono::Utc::now() + chrono::Duration::days(30));
    state.db.upsert_user(&user).await.expect("insert user");
    user.id
}

/// Likes in both directions, written straight to the store.
#[allow(dead_code)]
pub async fn make_mutual(state: &AppState, a: &str, b: &str) {
    state
        .db
        .insert_edge(EdgeKind::Like, &Edge::new(a, b))
        .await
        .unwrap();
    state
        .db
        .insert_edge(EdgeKind::Like, &Edge::new(b, a))
        .await
        .unwrap();
}

/// Register a fake connection for `user_id` and return its event stream.
#[allow(dead_code)]
pub fn connect(state: &AppState, user_id: &str) -> (ConnectionHandle, mpsc::Receiver<ServerEvent>) {
    let (handle, rx) = ConnectionHandle::new();
    state.connections.register(user_id, handle.clone());
    (handle, rx)
}

/// Everything queued on `rx` right now.
#[allow(dead_code)]
pub fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
