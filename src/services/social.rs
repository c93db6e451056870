// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Likes, dislikes, blocks, reports and the mutual-interest gate.
//!
//! Repeating an action is a success that creates nothing. Only likes are
//! metered, and only when a new edge would be created.

use crate::db::Store;
use crate::error::{AppError, ForbiddenReason, Result};
use crate::models::{Edge, EdgeKind, MeteredAction, ProfileCard, Report, ReportReason, User};
use crate::services::entitlement::EntitlementService;
use crate::services::presence::{ConnectionRegistry, ServerEvent};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Result of a like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LikeOutcome {
    /// `false` if the like already existed
    pub created: bool,
    /// Whether the target also likes the caller
    pub mutual: bool,
}

/// Result of an idempotent edge action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EdgeOutcome {
    pub created: bool,
}

/// Reject anything that is not a UUID before touching the store.
pub fn validate_user_id(user_id: &str) -> Result<()> {
    uuid::Uuid::parse_str(user_id)
        .map(|_| ())
        .map_err(|_| AppError::BadRequest(format!("Invalid user ID '{}'", user_id)))
}

/// True iff likes exist in both directions. Always read fresh from the store.
pub async fn mutual_like_exists(db: &dyn Store, a: &str, b: &str) -> Result<bool> {
    Ok(db.edge_exists(EdgeKind::Like, a, b).await?
        && db.edge_exists(EdgeKind::Like, b, a).await?)
}

pub struct SocialService {
    db: Arc<dyn Store>,
    entitlements: Arc<EntitlementService>,
    connections: Arc<ConnectionRegistry>,
}

impl SocialService {
    pub fn new(
        db: Arc<dyn Store>,
        entitlements: Arc<EntitlementService>,
        connections: Arc<ConnectionRegistry>,
    ) -> Self {
        Self {
            db,
            entitlements,
            connections,
        }
    }

    /// Validate both IDs, refuse self-targeting, and load the target.
    async fn resolve_target(&self, user_id: &str, target_user_id: &str) -> Result<User> {
        validate_user_id(user_id)?;
        validate_user_id(target_user_id)?;
        if user_id == target_user_id {
            return Err(AppError::Forbidden(ForbiddenReason::SelfAction));
        }
        self.db
            .get_user(target_user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", target_user_id)))
    }

    pub async fn perform_like(&self, user_id: &str, target_user_id: &str) -> Result<LikeOutcome> {
        self.resolve_target(user_id, target_user_id).await?;

        if self
            .db
            .edge_exists(EdgeKind::Like, user_id, target_user_id)
            .await?
        {
            let mutual = self
                .db
                .edge_exists(EdgeKind::Like, target_user_id, user_id)
                .await?;
            return Ok(LikeOutcome {
                created: false,
                mutual,
            });
        }

        self.entitlements
            .try_reserve_action(user_id, MeteredAction::Like)
            .await?;

        let created = self
            .db
            .insert_edge(EdgeKind::Like, &Edge::new(user_id, target_user_id))
            .await?;
        let mutual = self
            .db
            .edge_exists(EdgeKind::Like, target_user_id, user_id)
            .await?;

        tracing::info!(user_id, target_user_id, created, mutual, "Like");

        if created {
            self.notify_like(user_id, target_user_id, mutual).await;
        }

        Ok(LikeOutcome { created, mutual })
    }

    async fn notify_like(&self, user_id: &str, target_user_id: &str, mutual: bool) {
        let name = match self.db.get_user(user_id).await {
            Ok(Some(liker)) => liker.name,
            Ok(None) => String::new(),
            Err(e) => {
                tracing::debug!(error = %e, user_id, "Could not load liker for notification");
                String::new()
            }
        };

        self.connections.push_to(
            target_user_id,
            ServerEvent::LikedByUser {
                user_id: user_id.to_string(),
                name,
            },
        );

        if mutual {
            self.connections.push_to(
                target_user_id,
                ServerEvent::MutualLike {
                    user_id: user_id.to_string(),
                },
            );
            self.connections.push_to(
                user_id,
                ServerEvent::MutualLike {
                    user_id: target_user_id.to_string(),
                },
            );
        }
    }

    /// Remove a like. Returns whether there was one.
    pub async fn unlike(&self, user_id: &str, target_user_id: &str) -> Result<bool> {
        self.resolve_target(user_id, target_user_id).await?;

        let removed = self
            .db
            .delete_edge(EdgeKind::Like, user_id, target_user_id)
            .await?;

        if removed {
            tracing::info!(user_id, target_user_id, "Unlike");
            self.connections.push_to(
                target_user_id,
                ServerEvent::UserUnliked {
                    user_id: user_id.to_string(),
                },
            );
        }
        Ok(removed)
    }

    pub async fn dislike(&self, user_id: &str, target_user_id: &str) -> Result<EdgeOutcome> {
        self.insert_plain_edge(EdgeKind::Dislike, user_id, target_user_id)
            .await
    }

    pub async fn block(&self, user_id: &str, target_user_id: &str) -> Result<EdgeOutcome> {
        self.insert_plain_edge(EdgeKind::Block, user_id, target_user_id)
            .await
    }

    async fn insert_plain_edge(
        &self,
        kind: EdgeKind,
        user_id: &str,
        target_user_id: &str,
    ) -> Result<EdgeOutcome> {
        self.resolve_target(user_id, target_user_id).await?;
        let created = self
            .db
            .insert_edge(kind, &Edge::new(user_id, target_user_id))
            .await?;
        tracing::info!(user_id, target_user_id, kind = kind.as_str(), created, "Edge recorded");
        Ok(EdgeOutcome { created })
    }

    /// File a report. A new report also removes likes in both directions.
    pub async fn report_user(
        &self,
        reporter_id: &str,
        reported_user_id: &str,
        reason: &str,
        details: Option<String>,
    ) -> Result<EdgeOutcome> {
        let reason: ReportReason = reason.parse().map_err(AppError::BadRequest)?;
        self.resolve_target(reporter_id, reported_user_id).await?;

        let report = Report {
            reporter_id: reporter_id.to_string(),
            reported_user_id: reported_user_id.to_string(),
            reason,
            details: details.unwrap_or_default(),
            created_at: Utc::now(),
        };

        let created = self.db.insert_report(&report).await?;
        if created {
            self.db
                .delete_edge(EdgeKind::Like, reporter_id, reported_user_id)
                .await?;
            self.db
                .delete_edge(EdgeKind::Like, reported_user_id, reporter_id)
                .await?;
        }

        tracing::info!(
            reporter_id,
            reported_user_id,
            reason = reason.as_str(),
            created,
            "User reported"
        );
        Ok(EdgeOutcome { created })
    }

    /// Mutual-interest gate for chat.
    pub async fn can_chat(&self, user_a: &str, user_b: &str) -> Result<bool> {
        mutual_like_exists(self.db.as_ref(), user_a, user_b).await
    }

    // ─── Listings ────────────────────────────────────────────────

    /// Users the caller has liked, newest first.
    pub async fn liked_users(&self, user_id: &str) -> Result<Vec<ProfileCard>> {
        let mut edges = self.db.edges_from(EdgeKind::Like, user_id).await?;
        edges.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.cards(edges.iter().map(|e| e.target_user_id.as_str()))
            .await
    }

    /// Users who liked the caller and have not been liked back. Metered.
    pub async fn who_liked_me(&self, user_id: &str) -> Result<Vec<ProfileCard>> {
        self.entitlements
            .try_reserve_action(user_id, MeteredAction::WhoLikedMe)
            .await?;

        let liked: HashSet<String> = self
            .db
            .edges_from(EdgeKind::Like, user_id)
            .await?
            .into_iter()
            .map(|e| e.target_user_id)
            .collect();

        let mut incoming = self.db.edges_to(EdgeKind::Like, user_id).await?;
        incoming.retain(|e| !liked.contains(&e.user_id));
        incoming.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        self.cards(incoming.iter().map(|e| e.user_id.as_str()))
            .await
    }

    pub async fn mutual_likes(&self, user_id: &str) -> Result<Vec<ProfileCard>> {
        let liked_me: HashSet<String> = self
            .db
            .edges_to(EdgeKind::Like, user_id)
            .await?
            .into_iter()
            .map(|e| e.user_id)
            .collect();

        let mut outgoing = self.db.edges_from(EdgeKind::Like, user_id).await?;
        outgoing.retain(|e| liked_me.contains(&e.target_user_id));
        outgoing.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        self.cards(outgoing.iter().map(|e| e.target_user_id.as_str()))
            .await
    }

    /// Profile cards for IDs, skipping users that no longer exist.
    async fn cards<'a>(&self, ids: impl Iterator<Item = &'a str>) -> Result<Vec<ProfileCard>> {
        let today = Utc::now().date_naive();
        let mut cards = Vec::new();
        for id in ids {
            if let Some(user) = self.db.get_user(id).await? {
                cards.push(ProfileCard::from_user(&user, today));
            }
        }
        Ok(cards)
    }
}
