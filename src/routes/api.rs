// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{DiscoverySection, Plan, ProfileCard};
use crate::routes::{paginate, PageQuery, Paged};
use crate::services::chat::{ConversationSummary, OpenOutcome, SendOutcome};
use crate::services::discovery::{DiscoveryPage, DEFAULT_PER_PAGE};
use crate::services::entitlement::UsageSummary;
use crate::services::presence::ChatMessagePayload;
use crate::services::social::{EdgeOutcome, LikeOutcome};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/plans", get(list_plans))
        .route("/api/plans/upgrade", post(upgrade_plan))
        .route("/api/plans/{name}", get(get_plan))
        .route("/api/users/{id}/like", post(like_user).delete(unlike_user))
        .route("/api/users/{id}/dislike", post(dislike_user))
        .route("/api/users/{id}/block", post(block_user))
        .route("/api/users/{id}/report", post(report_user))
        .route("/api/likes/sent", get(likes_sent))
        .route("/api/likes/received", get(likes_received))
        .route("/api/likes/mutual", get(likes_mutual))
        .route("/api/discover/{section}", get(discover))
        .route("/api/chats", get(list_chats))
        .route("/api/chats/{id}", get(chat_history).post(send_message))
        .route("/api/chats/{id}/read", post(open_chat))
}

// ─── User & Plans ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
pub struct MeResponse {
    pub profile: ProfileCard,
    pub entitlements: UsageSummary,
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let (profile, _) = state.entitlements.get_effective_plan(&user.user_id).await?;
    let entitlements = state.entitlements.usage_summary(&user.user_id).await?;

    Ok(Json(MeResponse {
        profile: ProfileCard::from_user(&profile, chrono::Utc::now().date_naive()),
        entitlements,
    }))
}

async fn list_plans(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Plan>>> {
    Ok(Json(state.entitlements.list_plans().await?))
}

async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Plan>> {
    Ok(Json(state.entitlements.get_plan(&name).await?))
}

#[derive(Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UpgradeRequest {
    #[validate(length(min = 1, max = 32))]
    pub plan: String,
}

/// Switch plans. Payment is settled before this is called.
async fn upgrade_plan(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpgradeRequest>,
) -> Result<Json<UsageSummary>> {
    body.validate()?;
    Ok(Json(
        state
            .entitlements
            .upgrade_plan(&user.user_id, &body.plan)
            .await?,
    ))
}

// ─── Social Actions ──────────────────────────────────────────

async fn like_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target): Path<String>,
) -> Result<Json<LikeOutcome>> {
    Ok(Json(state.social.perform_like(&user.user_id, &target).await?))
}

#[derive(Serialize)]
pub struct UnlikeResponse {
    pub removed: bool,
}

async fn unlike_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target): Path<String>,
) -> Result<Json<UnlikeResponse>> {
    let removed = state.social.unlike(&user.user_id, &target).await?;
    Ok(Json(UnlikeResponse { removed }))
}

async fn dislike_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target): Path<String>,
) -> Result<Json<EdgeOutcome>> {
    Ok(Json(state.social.dislike(&user.user_id, &target).await?))
}

async fn block_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target): Path<String>,
) -> Result<Json<EdgeOutcome>> {
    Ok(Json(state.social.block(&user.user_id, &target).await?))
}

#[derive(Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ReportRequest {
    #[validate(length(min = 1, max = 32))]
    pub reason: String,
    #[validate(length(max = 500))]
    pub details: Option<String>,
}

async fn report_user(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(target): Path<String>,
    Json(body): Json<ReportRequest>,
) -> Result<Json<EdgeOutcome>> {
    body.validate()?;
    Ok(Json(
        state
            .social
            .report_user(&user.user_id, &target, &body.reason, body.details)
            .await?,
    ))
}

// ─── Like Listings ───────────────────────────────────────────

async fn likes_sent(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paged<ProfileCard>>> {
    let (page, per_page) = params.resolve()?;
    let users = state.social.liked_users(&user.user_id).await?;
    Ok(Json(paginate(users, page, per_page)))
}

/// One-sided likes of the caller. Each request uses one WHO_LIKED_ME.
async fn likes_received(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paged<ProfileCard>>> {
    let (page, per_page) = params.resolve()?;
    let users = state.social.who_liked_me(&user.user_id).await?;
    Ok(Json(paginate(users, page, per_page)))
}

async fn likes_mutual(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Paged<ProfileCard>>> {
    let (page, per_page) = params.resolve()?;
    let users = state.social.mutual_likes(&user.user_id).await?;
    Ok(Json(paginate(users, page, per_page)))
}

// ─── Discovery ───────────────────────────────────────────────

#[derive(Deserialize)]
struct DiscoverQuery {
    per_page: Option<u32>,
}

async fn discover(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(section): Path<String>,
    Query(params): Query<DiscoverQuery>,
) -> Result<Json<DiscoveryPage>> {
    let section: DiscoverySection = section.parse().map_err(AppError::NotFound)?;
    let per_page = params.per_page.unwrap_or(DEFAULT_PER_PAGE);

    tracing::debug!(
        user_id = %user.user_id,
        section = section.slug(),
        per_page,
        "Discover request"
    );

    Ok(Json(
        state
            .discovery
            .perform_discover_query(&user.user_id, section, per_page)
            .await?,
    ))
}

// ─── Chat ────────────────────────────────────────────────────

async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ConversationSummary>>> {
    Ok(Json(state.chat.list_conversations(&user.user_id).await?))
}

async fn chat_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(counterpart): Path<String>,
    Query(params): Query<PageQuery>,
) -> Result<Json<Vec<ChatMessagePayload>>> {
    let (page, per_page) = params.resolve()?;
    Ok(Json(
        state
            .chat
            .history(&user.user_id, &counterpart, page, per_page)
            .await?,
    ))
}

#[derive(Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct SendMessageRequest {
    #[validate(length(min = 1, max = 2000))]
    pub text: String,
}

async fn send_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(receiver): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<Json<SendOutcome>> {
    body.validate()?;
    Ok(Json(
        state
            .chat
            .send_message(&user.user_id, &receiver, &body.text)
            .await?,
    ))
}

async fn open_chat(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(counterpart): Path<String>,
) -> Result<Json<OpenOutcome>> {
    Ok(Json(
        state
            .chat
            .open_conversation(&user.user_id, &counterpart)
            .await?,
    ))
}
