// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Scheduler and admin routes.
//!
//! These endpoints are called by the external scheduler and by operators,
//! not by app users. `require_tasks_auth` guards all of them.

use crate::error::Result;
use crate::models::Plan;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Json, State},
    routing::{post, put},
    Router,
};
use serde::Serialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/reset-daily-usage", post(reset_daily_usage))
        .route("/admin/plans", put(upsert_plan))
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub users_reset: usize,
    pub reset_at: String,
}

/// Zero all usage counters. Called once a day; safe to retry.
async fn reset_daily_usage(State(state): State<Arc<AppState>>) -> Result<Json<ResetResponse>> {
    let users_reset = state.entitlements.reset_daily_usage().await?;
    Ok(Json(ResetResponse {
        users_reset,
        reset_at: format_utc_rfc3339(chrono::Utc::now()),
    }))
}

/// Create or replace the catalog entry for `plan.name`.
async fn upsert_plan(
    State(state): State<Arc<AppState>>,
    Json(plan): Json<Plan>,
) -> Result<Json<Plan>> {
    state.entitlements.upsert_plan(&plan).await?;
    Ok(Json(plan))
}
