// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared-secret authentication for scheduler and admin routes.

use crate::config::TASKS_TOKEN_HEADER;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Require `x-tasks-token` to match `TASKS_TOKEN` for `/tasks/*` and `/admin/*`.
pub async fn require_tasks_auth(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(TASKS_TOKEN_HEADER)
        .map(|h| h.as_bytes())
        .unwrap_or_default();

    let valid: bool = provided
        .ct_eq(state.config.tasks_token.as_bytes())
        .into();

    if provided.is_empty() || !valid {
        tracing::warn!(
            path = %request.uri().path(),
            "Blocked tasks request with missing or invalid token"
        );
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(request).await)
}
