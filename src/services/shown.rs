// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-section record of candidates already surfaced to a user.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::DiscoverySection;
use std::sync::Arc;

pub struct ShownSetTracker {
    db: Arc<dyn Store>,
}

impl ShownSetTracker {
    pub fn new(db: Arc<dyn Store>) -> Self {
        Self { db }
    }

    /// Add `target_user_id` to the section's shown-set. No-op if already there.
    pub async fn mark_user_as_shown(
        &self,
        user_id: &str,
        section: DiscoverySection,
        target_user_id: &str,
    ) -> Result<()> {
        self.mark_all_shown(user_id, section, &[target_user_id.to_string()])
            .await
    }

    /// Add a whole batch in one write.
    pub async fn mark_all_shown(
        &self,
        user_id: &str,
        section: DiscoverySection,
        target_user_ids: &[String],
    ) -> Result<()> {
        if target_user_ids.is_empty() {
            return Ok(());
        }
        self.db.add_shown(user_id, section, target_user_ids).await
    }

    /// True iff `target_user_id` has never been shown to `user_id` in `section`.
    pub async fn can_show_user(
        &self,
        user_id: &str,
        section: DiscoverySection,
        target_user_id: &str,
    ) -> Result<bool> {
        let user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        Ok(!user.shown.contains(section, target_user_id))
    }
}
