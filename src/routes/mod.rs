// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! HTTP route handlers.

pub mod api;
pub mod realtime;
pub mod tasks;

use crate::middleware::{require_auth, require_tasks_auth};
use crate::AppState;
use axum::http::{header, HeaderName, Method};
use axum::{extract::State, middleware, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

#[derive(Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct HealthResponse {
    pub status: String,
    pub build_id: String,
    /// Live realtime connections on this instance
    pub connections: usize,
}

/// Health check response
async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let build_id = option_env!("BUILD_ID").unwrap_or("unknown").to_string();
    Json(HealthResponse {
        status: "ok".to_string(),
        build_id,
        connections: state.connections.online_count(),
    })
}

/// `page`/`per_page` query parameters shared by list endpoints.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// 1-indexed
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

fn default_page() -> u32 {
    1
}
fn default_per_page() -> u32 {
    20
}

pub const MAX_PER_PAGE: u32 = 100;

impl PageQuery {
    /// Validated `(page, per_page)`, with `per_page` capped.
    pub fn resolve(&self) -> crate::error::Result<(u32, u32)> {
        if self.page < 1 {
            return Err(crate::error::AppError::BadRequest(
                "Page must be greater than 0".to_string(),
            ));
        }
        Ok((self.page, self.per_page.clamp(1, MAX_PER_PAGE)))
    }
}

/// One page of a list.
#[derive(Debug, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: usize,
}

/// Slice an already-ordered list into a page.
pub fn paginate<T>(items: Vec<T>, page: u32, per_page: u32) -> Paged<T> {
    let total = items.len();
    let start = (page as usize - 1).saturating_mul(per_page as usize);
    let items = items
        .into_iter()
        .skip(start)
        .take(per_page as usize)
        .collect();
    Paged {
        items,
        page,
        per_page,
        total,
    }
}

/// Build the complete router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer - allow requests from frontend URL and localhost (for dev)
    let frontend_url = state.config.frontend_url.clone();
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::AllowOrigin::predicate(
            move |origin: &axum::http::HeaderValue, _request_parts: &axum::http::request::Parts| {
                let origin_str = origin.to_str().unwrap_or("");
                origin_str == frontend_url
                    || origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static(crate::config::TASKS_TOKEN_HEADER),
        ]);

    let public_routes = Router::new().route("/health", get(health_check));

    // Scheduler and admin callers
    let tasks_routes = tasks::routes().route_layer(middleware::from_fn_with_state(
        state.clone(),
        require_tasks_auth,
    ));

    // Protected routes (auth required)
    let protected_routes = api::routes()
        .merge(realtime::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(tasks_routes)
        .merge(protected_routes)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate_middle_and_past_end() {
        let page = paginate((1..=25).collect::<Vec<_>>(), 2, 10);
        assert_eq!(page.items, (11..=20).collect::<Vec<_>>());
        assert_eq!(page.total, 25);

        let empty = paginate((1..=5).collect::<Vec<_>>(), 3, 10);
        assert!(empty.items.is_empty());
    }

    #[test]
    fn test_page_zero_rejected() {
        let query = PageQuery {
            page: 0,
            per_page: 10,
        };
        assert!(query.resolve().is_err());
    }
}
