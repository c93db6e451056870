// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Subscription plan catalog and metered actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Subscription tier. Exactly one catalog entry exists per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanName {
    #[default]
    Free,
    Boost,
    Premium,
}

impl PlanName {
    pub const ALL: [PlanName; 3] = [PlanName::Free, PlanName::Boost, PlanName::Premium];

    pub fn as_str(self) -> &'static str {
        match self {
            PlanName::Free => "FREE",
            PlanName::Boost => "BOOST",
            PlanName::Premium => "PREMIUM",
        }
    }
}

impl fmt::Display for PlanName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanName {
    type Err = String;

    /// Case-insensitive, so `/api/plans/premium` resolves.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FREE" => Ok(PlanName::Free),
            "BOOST" => Ok(PlanName::Boost),
            "PREMIUM" => Ok(PlanName::Premium),
            other => Err(format!("Unknown plan '{}'", other)),
        }
    }
}

/// Actions with a daily quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MeteredAction {
    Like,
    WhoLikedMe,
    Discover,
}

impl MeteredAction {
    pub const ALL: [MeteredAction; 3] = [
        MeteredAction::Like,
        MeteredAction::WhoLikedMe,
        MeteredAction::Discover,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MeteredAction::Like => "LIKE",
            MeteredAction::WhoLikedMe => "WHO_LIKED_ME",
            MeteredAction::Discover => "DISCOVER",
        }
    }
}

/// A daily quota. Stored as an integer where `-1` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Limit {
    Unlimited,
    Daily(u32),
}

impl Limit {
    /// Whether one more use is allowed after `used` uses today.
    pub fn allows(self, used: u32) -> bool {
        match self {
            Limit::Unlimited => true,
            Limit::Daily(max) => used < max,
        }
    }

    /// Uses left today, `None` when unlimited.
    pub fn remaining(self, used: u32) -> Option<u32> {
        match self {
            Limit::Unlimited => None,
            Limit::Daily(max) => Some(max.saturating_sub(used)),
        }
    }
}

impl From<i64> for Limit {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            Limit::Unlimited
        } else {
            Limit::Daily(u32::try_from(raw).unwrap_or(u32::MAX))
        }
    }
}

impl From<Limit> for i64 {
    fn from(limit: Limit) -> Self {
        match limit {
            Limit::Unlimited => -1,
            Limit::Daily(max) => i64::from(max),
        }
    }
}

/// Catalog entry for a subscription tier.
///
/// Stored in the `plans` collection, keyed by plan name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub name: PlanName,
    pub daily_likes_limit: Limit,
    pub daily_who_liked_me_limit: Limit,
    /// Discover requests per day, also the page size cap per request.
    pub discover_limit_per_section: Limit,
    #[serde(default)]
    pub voice_call_enabled: bool,
    #[serde(default)]
    pub video_call_enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price_cents: u32,
}

impl Plan {
    /// The quota governing `action` under this plan.
    pub fn limit_for(&self, action: MeteredAction) -> Limit {
        match action {
            MeteredAction::Like => self.daily_likes_limit,
            MeteredAction::WhoLikedMe => self.daily_who_liked_me_limit,
            MeteredAction::Discover => self.discover_limit_per_section,
        }
    }

    /// Catalog seeded on first start. Existing entries are left alone.
    pub fn default_catalog() -> Vec<Plan> {
        vec![
            Plan {
                name: PlanName::Free,
                daily_likes_limit: Limit::Daily(5),
                daily_who_liked_me_limit: Limit::Daily(2),
                discover_limit_per_section: Limit::Daily(2),
                voice_call_enabled: false,
                video_call_enabled: false,
                description: "Basic access".to_string(),
                price_cents: 0,
            },
            Plan {
                name: PlanName::Boost,
                daily_likes_limit: Limit::Daily(25),
                daily_who_liked_me_limit: Limit::Daily(10),
                discover_limit_per_section: Limit::Daily(5),
                voice_call_enabled: true,
                video_call_enabled: false,
                description: "More likes and discovery".to_string(),
                price_cents: 999,
            },
            Plan {
                name: PlanName::Premium,
                daily_likes_limit: Limit::Unlimited,
                daily_who_liked_me_limit: Limit::Unlimited,
                discover_limit_per_section: Limit::Unlimited,
                voice_call_enabled: true,
                video_call_enabled: true,
                description: "Unlimited everything".to_string(),
                price_cents: 1999,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_limit_is_unlimited() {
        assert_eq!(Limit::from(-1), Limit::Unlimited);
        assert_eq!(Limit::from(-42), Limit::Unlimited);
        assert_eq!(Limit::from(5), Limit::Daily(5));
        assert_eq!(i64::from(Limit::Unlimited), -1);
    }

    #[test]
    fn test_limit_serializes_as_integer() {
        let json = serde_json::to_value(Limit::Unlimited).unwrap();
        assert_eq!(json, serde_json::json!(-1));

        let limit: Limit = serde_json::from_value(serde_json::json!(3)).unwrap();
        assert_eq!(limit, Limit::Daily(3));
    }

    #[test]
    fn test_daily_limit_boundary() {
        let limit = Limit::Daily(5);
        assert!(limit.allows(4));
        assert!(!limit.allows(5));
        assert_eq!(limit.remaining(7), Some(0));
    }

    #[test]
    fn test_unlimited_never_denies() {
        assert!(Limit::Unlimited.allows(u32::MAX));
        assert_eq!(Limit::Unlimited.remaining(1_000), None);
    }

    #[test]
    fn test_plan_name_parse_is_case_insensitive() {
        assert_eq!("premium".parse::<PlanName>().unwrap(), PlanName::Premium);
        assert_eq!(" Boost ".parse::<PlanName>().unwrap(), PlanName::Boost);
        assert!("GOLD".parse::<PlanName>().is_err());
    }

    #[test]
    fn test_default_catalog_covers_every_tier_once() {
        let catalog = Plan::default_catalog();
        for name in PlanName::ALL {
            assert_eq!(catalog.iter().filter(|p| p.name == name).count(), 1);
        }
    }
}
