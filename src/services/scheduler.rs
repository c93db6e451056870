// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process daily usage reset.
//!
//! Runs alongside `POST /tasks/reset-daily-usage`. The reset is idempotent,
//! so several instances firing at midnight is harmless.

use crate::services::EntitlementService;
use crate::time_utils::duration_until_next_utc_midnight;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Spawn a task that resets usage at every UTC midnight.
pub fn spawn_daily_reset(entitlements: Arc<EntitlementService>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = duration_until_next_utc_midnight(chrono::Utc::now());
            tracing::debug!(seconds = wait.as_secs(), "Next daily usage reset scheduled");
            tokio::time::sleep(wait).await;

            if let Err(e) = entitlements.reset_daily_usage().await {
                tracing::error!(error = %e, "Scheduled daily usage reset failed");
            }
        }
    })
}
