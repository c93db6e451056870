// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Discovery feeds.
//!
//! One request costs one DISCOVER use regardless of how many candidates it
//! returns. Everything returned is added to the section's shown-set so it
//! never comes back in that section.

use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{DiscoverySection, EdgeKind, Limit, MeteredAction, ProfileCard, User};
use crate::services::entitlement::EntitlementService;
use crate::services::shown::ShownSetTracker;
use chrono::{NaiveDate, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_PER_PAGE: u32 = 10;
pub const MAX_PER_PAGE: u32 = 50;

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryCandidate {
    #[serde(flatten)]
    pub profile: ProfileCard,
    /// What the candidate has in common with the viewer for this section
    pub common: Vec<String>,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryPage {
    pub section: DiscoverySection,
    pub candidates: Vec<DiscoveryCandidate>,
    /// DISCOVER uses left today after this request, `None` if unlimited
    pub remaining_today: Option<u32>,
}

pub struct DiscoveryService {
    db: Arc<dyn Store>,
    entitlements: Arc<EntitlementService>,
    shown: ShownSetTracker,
}

impl DiscoveryService {
    pub fn new(db: Arc<dyn Store>, entitlements: Arc<EntitlementService>) -> Self {
        Self {
            shown: ShownSetTracker::new(db.clone()),
            db,
            entitlements,
        }
    }

    pub async fn perform_discover_query(
        &self,
        user_id: &str,
        section: DiscoverySection,
        per_page: u32,
    ) -> Result<DiscoveryPage> {
        let (viewer, _) = self.entitlements.get_effective_plan(user_id).await?;
        check_section_prerequisites(&viewer, section)?;

        let plan = self
            .entitlements
            .try_reserve_action(user_id, MeteredAction::Discover)
            .await?;
        let limit = plan.limit_for(MeteredAction::Discover);

        let excluded = self.excluded_ids(&viewer).await?;
        let population = self.db.list_verified_users().await?;

        let today = Utc::now().date_naive();
        let mut candidates = rank_candidates(&viewer, section, population, &excluded, today);
        candidates.truncate(page_size(per_page, limit));

        let shown_ids: Vec<String> = candidates.iter().map(|c| c.profile.id.clone()).collect();
        self.shown.mark_all_shown(user_id, section, &shown_ids).await?;

        tracing::info!(
            user_id,
            section = section.slug(),
            returned = candidates.len(),
            "Discovery query"
        );

        Ok(DiscoveryPage {
            section,
            candidates,
            remaining_today: limit.remaining(
                viewer
                    .usage
                    .used(MeteredAction::Discover)
                    .saturating_add(1),
            ),
        })
    }

    /// Users the viewer blocked or reported, and users who blocked the viewer.
    async fn excluded_ids(&self, viewer: &User) -> Result<HashSet<String>> {
        let mut excluded: HashSet<String> = self
            .db
            .edges_from(EdgeKind::Block, &viewer.id)
            .await?
            .into_iter()
            .map(|e| e.target_user_id)
            .collect();

        excluded.extend(
            self.db
                .edges_to(EdgeKind::Block, &viewer.id)
                .await?
                .into_iter()
                .map(|e| e.user_id),
        );

        excluded.extend(
            self.db
                .reports_by(&viewer.id)
                .await?
                .into_iter()
                .map(|r| r.reported_user_id),
        );

        Ok(excluded)
    }
}

/// Candidates per request: the caller's `per_page`, capped by the plan.
pub fn page_size(per_page: u32, limit: Limit) -> usize {
    let requested = per_page.clamp(1, MAX_PER_PAGE);
    let capped = match limit {
        Limit::Unlimited => requested,
        Limit::Daily(max) => requested.min(max),
    };
    capped as usize
}

fn check_section_prerequisites(viewer: &User, section: DiscoverySection) -> Result<()> {
    let missing = match section {
        DiscoverySection::SimilarInterest => viewer.interests.is_empty().then_some("interests"),
        DiscoverySection::SameDatingGoals => viewer
            .relationship_goals
            .is_empty()
            .then_some("relationship goals"),
        DiscoverySection::CommunitiesInCommon => viewer.religion.is_none().then_some("religion"),
        DiscoverySection::Recommended => None,
    };

    match missing {
        Some(field) => Err(AppError::BadRequest(format!(
            "Add {} to your profile to use this section",
            field
        ))),
        None => Ok(()),
    }
}

fn shared(a: &[String], b: &[String]) -> Vec<String> {
    a.iter()
        .filter(|x| b.iter().any(|y| y.eq_ignore_ascii_case(x)))
        .cloned()
        .collect()
}

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a.eq_ignore_ascii_case(b))
}

/// What `candidate` shares with `viewer` under `section`. `None` if ineligible.
fn match_section(viewer: &User, candidate: &User, section: DiscoverySection) -> Option<(Vec<String>, u32)> {
    let interests = shared(&viewer.interests, &candidate.interests);
    let goals = shared(&viewer.relationship_goals, &candidate.relationship_goals);
    let same_religion = same_text(viewer.religion.as_deref(), candidate.religion.as_deref());

    let mut communities = Vec::new();
    if same_religion {
        communities.extend(candidate.religion.clone());
        if same_text(viewer.caste.as_deref(), candidate.caste.as_deref()) {
            communities.extend(candidate.caste.clone());
        }
    }

    let common = match section {
        DiscoverySection::SimilarInterest => interests,
        DiscoverySection::SameDatingGoals => goals,
        DiscoverySection::CommunitiesInCommon => communities,
        DiscoverySection::Recommended => {
            let common: Vec<String> = interests.into_iter().chain(goals).chain(communities).collect();
            let score = u32::try_from(common.len()).unwrap_or(u32::MAX);
            return Some((common, score));
        }
    };

    if common.is_empty() {
        return None;
    }
    let score = u32::try_from(common.len()).unwrap_or(u32::MAX);
    Some((common, score))
}

/// Filter `population` down to eligible candidates and order them.
///
/// Recommended is ranked by score (ties by ID); the other sections are shuffled.
pub fn rank_candidates(
    viewer: &User,
    section: DiscoverySection,
    population: Vec<User>,
    excluded: &HashSet<String>,
    today: NaiveDate,
) -> Vec<DiscoveryCandidate> {
    let mut candidates: Vec<DiscoveryCandidate> = population
        .into_iter()
        .filter(|c| c.id != viewer.id && c.is_verified)
        .filter(|c| !excluded.contains(&c.id))
        .filter(|c| !viewer.shown.contains(section, &c.id))
        .filter(|c| c.matches_preference_of(viewer))
        .filter_map(|c| {
            let (common, score) = match_section(viewer, &c, section)?;
            Some(DiscoveryCandidate {
                profile: ProfileCard::from_user(&c, today),
                common,
                score,
            })
        })
        .collect();

    if section == DiscoverySection::Recommended {
        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| a.profile.id.cmp(&b.profile.id))
        });
    } else {
        candidates.shuffle(&mut rand::thread_rng());
    }

    candidates
}
