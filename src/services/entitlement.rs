// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan registry, usage ledger and the entitlement gate.
//!
//! The gate is exposed two ways:
//! - [`EntitlementService::try_reserve_action`] checks and consumes one use in a
//!   single store operation. Every metered flow in this crate uses it.
//! - [`EntitlementService::can_perform_action`] and
//!   [`EntitlementService::increment_action_usage`] are the separate query and
//!   increment. Pairing them leaves a window where concurrent requests can
//!   overshoot the limit by a few uses.

use crate::db::Store;
use crate::error::{AppError, ForbiddenReason, Result};
use crate::models::{DailyUsage, Limit, MeteredAction, Plan, PlanName, User};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

pub struct EntitlementService {
    db: Arc<dyn Store>,
    plan_duration: Duration,
}

/// Remaining quota for one metered action.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct ActionQuota {
    pub action: MeteredAction,
    pub used: u32,
    /// `None` when unlimited
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
}

/// What `GET /api/me` returns about entitlements.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UsageSummary {
    pub user_id: String,
    pub plan: PlanName,
    pub plan_expiry: Option<DateTime<Utc>>,
    pub voice_call_enabled: bool,
    pub video_call_enabled: bool,
    pub quotas: Vec<ActionQuota>,
}

impl EntitlementService {
    pub fn new(db: Arc<dyn Store>, plan_duration_days: i64) -> Self {
        Self {
            db,
            plan_duration: Duration::days(plan_duration_days),
        }
    }

    /// Resolve a user together with the plan that currently applies.
    ///
    /// A paid plan past its expiry is downgraded to FREE and persisted before
    /// the plan is looked up.
    pub async fn get_effective_plan(&self, user_id: &str) -> Result<(User, Plan)> {
        let mut user = self
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;

        if user.plan_expired(Utc::now()) {
            tracing::info!(
                user_id,
                plan = %user.plan,
                expiry = ?user.plan_expiry,
                "Plan expired, downgrading to FREE"
            );
            self.db.set_user_plan(user_id, PlanName::Free, None).await?;
            user.plan = PlanName::Free;
            user.plan_expiry = None;
        }

        let plan = self.db.get_plan(user.plan).await?.ok_or_else(|| {
            AppError::Configuration(format!("No catalog entry for plan {}", user.plan))
        })?;

        Ok((user, plan))
    }

    /// Query-only gate check. Does not consume anything.
    pub async fn can_perform_action(&self, user_id: &str, action: MeteredAction) -> Result<bool> {
        let (user, plan) = self.get_effective_plan(user_id).await?;
        Ok(plan.limit_for(action).allows(user.usage.used(action)))
    }

    /// Record one completed use of `action`.
    pub async fn increment_action_usage(&self, user_id: &str, action: MeteredAction) -> Result<()> {
        self.db.increment_usage(user_id, action).await?;
        tracing::debug!(user_id, action = ?action, "Usage incremented");
        Ok(())
    }

    /// Check and consume one use of `action` in one step.
    ///
    /// Returns the plan that granted it. A used-up quota is
    /// `Forbidden(QuotaExceeded)` and leaves the counter untouched.
    pub async fn try_reserve_action(&self, user_id: &str, action: MeteredAction) -> Result<Plan> {
        let (_, plan) = self.get_effective_plan(user_id).await?;
        let limit = plan.limit_for(action);

        if limit == Limit::Unlimited {
            self.db.increment_usage(user_id, action).await?;
            return Ok(plan);
        }

        if !self.db.reserve_usage(user_id, action, limit).await? {
            tracing::info!(user_id, action = ?action, plan = %plan.name, "Daily quota exhausted");
            return Err(AppError::Forbidden(ForbiddenReason::QuotaExceeded(action)));
        }

        Ok(plan)
    }

    /// Zero every user's counters. Safe to run repeatedly.
    pub async fn reset_daily_usage(&self) -> Result<usize> {
        let reset = self.db.reset_all_usage().await?;
        tracing::info!(users_reset = reset, "Daily usage reset");
        Ok(reset)
    }

    pub async fn usage_summary(&self, user_id: &str) -> Result<UsageSummary> {
        let (user, plan) = self.get_effective_plan(user_id).await?;
        Ok(summarize(&user, &plan))
    }

    // ─── Plan catalog ────────────────────────────────────────────

    /// Insert catalog entries that are missing. Returns how many were added.
    pub async fn seed_default_plans(&self) -> Result<usize> {
        let mut seeded = 0;
        for plan in Plan::default_catalog() {
            if self.db.get_plan(plan.name).await?.is_none() {
                self.db.upsert_plan(&plan).await?;
                seeded += 1;
            }
        }
        if seeded > 0 {
            tracing::info!(seeded, "Seeded plan catalog");
        }
        Ok(seeded)
    }

    pub async fn upsert_plan(&self, plan: &Plan) -> Result<()> {
        self.db.upsert_plan(plan).await?;
        tracing::info!(plan = %plan.name, "Plan upserted");
        Ok(())
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        self.db.list_plans().await
    }

    pub async fn get_plan(&self, name: &str) -> Result<Plan> {
        let name: PlanName = name.parse().map_err(AppError::NotFound)?;
        self.db
            .get_plan(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", name)))
    }

    /// Switch a user to `plan_name`. Paid plans run for the configured period.
    pub async fn upgrade_plan(&self, user_id: &str, plan_name: &str) -> Result<UsageSummary> {
        let name: PlanName = plan_name.parse().map_err(AppError::BadRequest)?;

        if self.db.get_plan(name).await?.is_none() {
            return Err(AppError::BadRequest(format!("Plan {} is not offered", name)));
        }

        let expiry = match name {
            PlanName::Free => None,
            _ => Some(Utc::now() + self.plan_duration),
        };

        self.db.set_user_plan(user_id, name, expiry).await?;
        tracing::info!(user_id, plan = %name, expiry = ?expiry, "Plan changed");

        self.usage_summary(user_id).await
    }
}

fn summarize(user: &User, plan: &Plan) -> UsageSummary {
    UsageSummary {
        user_id: user.id.clone(),
        plan: plan.name,
        plan_expiry: user.plan_expiry,
        voice_call_enabled: plan.voice_call_enabled,
        video_call_enabled: plan.video_call_enabled,
        quotas: MeteredAction::ALL
            .into_iter()
            .map(|action| quota(&user.usage, plan.limit_for(action), action))
            .collect(),
    }
}

fn quota(usage: &DailyUsage, limit: Limit, action: MeteredAction) -> ActionQuota {
    let used = usage.used(action);
    ActionQuota {
        action,
        used,
        limit: match limit {
            Limit::Unlimited => None,
            Limit::Daily(max) => Some(max),
        },
        remaining: limit.remaining(used),
    }
}
