// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use crate::models::MeteredAction;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why an otherwise well-formed request was refused.
///
/// Clients react differently to each (upgrade prompt, match-required
/// message, silently ignore), so the reason is part of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenReason {
    /// Daily quota for a metered action is used up.
    QuotaExceeded(MeteredAction),
    /// Chatting requires a like in both directions.
    MutualLikeRequired,
    /// Liking, blocking, reporting or messaging yourself.
    SelfAction,
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0:?}")]
    Forbidden(ForbiddenReason),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code, shared by HTTP bodies and realtime error events.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidToken => "invalid_token",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Forbidden(ForbiddenReason::QuotaExceeded(_)) => "quota_exceeded",
            AppError::Forbidden(ForbiddenReason::MutualLikeRequired) => "mutual_like_required",
            AppError::Forbidden(ForbiddenReason::SelfAction) => "self_action",
            AppError::Configuration(_) => "configuration_error",
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
        }
    }

    /// Client-facing detail text. Infrastructure errors are never echoed back.
    pub fn details(&self) -> Option<String> {
        match self {
            AppError::NotFound(msg) | AppError::BadRequest(msg) => Some(msg.clone()),
            AppError::Forbidden(ForbiddenReason::QuotaExceeded(action)) => Some(format!(
                "Daily limit reached for {}. Upgrade your plan for more.",
                action.as_str()
            )),
            AppError::Forbidden(ForbiddenReason::MutualLikeRequired) => {
                Some("Chat not allowed without mutual like".to_string())
            }
            AppError::Forbidden(ForbiddenReason::SelfAction) => {
                Some("You cannot perform this action on yourself".to_string())
            }
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Database(msg) => tracing::error!(error = %msg, "Database error"),
            AppError::Configuration(msg) => tracing::error!(error = %msg, "Configuration error"),
            AppError::Internal(err) => tracing::error!(error = %err, "Internal server error"),
            _ => {}
        }

        let body = ErrorResponse {
            error: self.code().to_string(),
            details: self.details(),
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
