//! User model for storage and API.

use crate::models::plan::{MeteredAction, PlanName};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User profile stored in Firestore.
///
/// Registration and profile editing live in the account service; this crate
/// reads profiles and owns the `plan`, `usage` and `shown` sub-documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable user ID (UUID, also used as document ID)
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub gender: Option<Gender>,
    /// Which genders the user wants to see in discovery
    #[serde(default)]
    pub show_me: Option<ShowMe>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub relationship_goals: Vec<String>,
    #[serde(default)]
    pub religion: Option<String>,
    #[serde(default)]
    pub caste: Option<String>,
    /// Profile image URLs, first is the primary one
    #[serde(default)]
    pub images: Vec<String>,
    /// Only verified users appear in discovery
    #[serde(default)]
    pub is_verified: bool,

    /// Stored tier; see `EntitlementService::get_effective_plan` for the live one.
    #[serde(default)]
    pub plan: PlanName,
    #[serde(default)]
    pub plan_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage: DailyUsage,
    #[serde(default)]
    pub shown: ShownSets,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// A fresh, unverified FREE user.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            gender: None,
            show_me: None,
            date_of_birth: None,
            interests: Vec::new(),
            relationship_goals: Vec::new(),
            religion: None,
            caste: None,
            images: Vec::new(),
            is_verified: false,
            plan: PlanName::Free,
            plan_expiry: None,
            usage: DailyUsage::default(),
            shown: ShownSets::default(),
            created_at: Utc::now(),
        }
    }

    /// True if a paid plan has run past its expiry at `now`.
    pub fn plan_expired(&self, now: DateTime<Utc>) -> bool {
        self.plan != PlanName::Free && self.plan_expiry.is_some_and(|expiry| expiry < now)
    }

    /// Age in whole years on `today`.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        let mut age = today.year() - dob.year();
        if (today.month(), today.day()) < (dob.month(), dob.day()) {
            age -= 1;
        }
        u32::try_from(age).ok()
    }

    /// Whether this user's gender passes `viewer`'s `show_me` preference.
    pub fn matches_preference_of(&self, viewer: &User) -> bool {
        match viewer.show_me {
            Some(ShowMe::Men) => self.gender == Some(Gender::Male),
            Some(ShowMe::Women) => self.gender == Some(Gender::Female),
            Some(ShowMe::Everyone) | None => true,
        }
    }
}

/// Public slice of a profile shown in listings and discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileCard {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    /// Primary image, if any
    pub image: Option<String>,
    pub is_verified: bool,
}

impl ProfileCard {
    pub fn from_user(user: &User, today: NaiveDate) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            age: user.age_on(today),
            image: user.images.first().cloned(),
            is_verified: user.is_verified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowMe {
    Men,
    Women,
    Everyone,
}

/// Per-day counters for metered actions. Zeroed by the daily reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyUsage {
    #[serde(default)]
    pub daily_likes_used: u32,
    #[serde(default)]
    pub daily_who_liked_me_used: u32,
    #[serde(default)]
    pub daily_discover_used: u32,
}

impl DailyUsage {
    pub fn used(&self, action: MeteredAction) -> u32 {
        match action {
            MeteredAction::Like => self.daily_likes_used,
            MeteredAction::WhoLikedMe => self.daily_who_liked_me_used,
            MeteredAction::Discover => self.daily_discover_used,
        }
    }

    pub fn increment(&mut self, action: MeteredAction) {
        let counter = match action {
            MeteredAction::Like => &mut self.daily_likes_used,
            MeteredAction::WhoLikedMe => &mut self.daily_who_liked_me_used,
            MeteredAction::Discover => &mut self.daily_discover_used,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn is_zero(&self) -> bool {
        *self == DailyUsage::default()
    }
}

/// Discovery feeds, each with its own "already shown" set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoverySection {
    SimilarInterest,
    SameDatingGoals,
    CommunitiesInCommon,
    Recommended,
}

impl DiscoverySection {
    pub const ALL: [DiscoverySection; 4] = [
        DiscoverySection::SimilarInterest,
        DiscoverySection::SameDatingGoals,
        DiscoverySection::CommunitiesInCommon,
        DiscoverySection::Recommended,
    ];

    /// URL path segment for the section.
    pub fn slug(self) -> &'static str {
        match self {
            DiscoverySection::SimilarInterest => "similar-interests",
            DiscoverySection::SameDatingGoals => "same-dating-goals",
            DiscoverySection::CommunitiesInCommon => "common-communities",
            DiscoverySection::Recommended => "recommended",
        }
    }
}

impl FromStr for DiscoverySection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiscoverySection::ALL
            .into_iter()
            .find(|section| section.slug() == s)
            .ok_or_else(|| format!("Unknown discovery section '{}'", s))
    }
}

/// Candidate IDs already surfaced to a user, one list per section.
///
/// Stored list-shaped; `insert` keeps set semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShownSets {
    #[serde(default)]
    pub similar_interest: Vec<String>,
    #[serde(default)]
    pub same_dating_goals: Vec<String>,
    #[serde(default)]
    pub communities_in_common: Vec<String>,
    #[serde(default)]
    pub recommended: Vec<String>,
}

impl ShownSets {
    pub fn get(&self, section: DiscoverySection) -> &[String] {
        match section {
            DiscoverySection::SimilarInterest => &self.similar_interest,
            DiscoverySection::SameDatingGoals => &self.same_dating_goals,
            DiscoverySection::CommunitiesInCommon => &self.communities_in_common,
            DiscoverySection::Recommended => &self.recommended,
        }
    }

    fn get_mut(&mut self, section: DiscoverySection) -> &mut Vec<String> {
        match section {
            DiscoverySection::SimilarInterest => &mut self.similar_interest,
            DiscoverySection::SameDatingGoals => &mut self.same_dating_goals,
            DiscoverySection::CommunitiesInCommon => &mut self.communities_in_common,
            DiscoverySection::Recommended => &mut self.recommended,
        }
    }

    pub fn contains(&self, section: DiscoverySection, user_id: &str) -> bool {
        self.get(section).iter().any(|id| id == user_id)
    }

    /// Add `user_id` to the section. Returns `false` if it was already there.
    pub fn insert(&mut self, section: DiscoverySection, user_id: &str) -> bool {
        if self.contains(section, user_id) {
            return false;
        }
        self.get_mut(section).push(user_id.to_string());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_shown_set_never_duplicates() {
        let mut shown = ShownSets::default();
        assert!(shown.insert(DiscoverySection::Recommended, "a"));
        assert!(!shown.insert(DiscoverySection::Recommended, "a"));
        assert_eq!(shown.get(DiscoverySection::Recommended), ["a".to_string()]);
        // Sections are independent
        assert!(!shown.contains(DiscoverySection::SimilarInterest, "a"));
    }

    #[test]
    fn test_section_slug_round_trip() {
        for section in DiscoverySection::ALL {
            assert_eq!(section.slug().parse::<DiscoverySection>().unwrap(), section);
        }
        assert!("trending".parse::<DiscoverySection>().is_err());
    }

    #[test]
    fn test_plan_expiry_only_applies_to_paid_plans() {
        let now = Utc::now();
        let mut user = User::new("u1", "Test");
        user.plan_expiry = Some(now - Duration::days(1));
        assert!(!user.plan_expired(now));

        user.plan = PlanName::Premium;
        assert!(user.plan_expired(now));

        user.plan_expiry = Some(now + Duration::days(1));
        assert!(!user.plan_expired(now));
    }

    #[test]
    fn test_age_before_and_after_birthday() {
        let mut user = User::new("u1", "Test");
        user.date_of_birth = NaiveDate::from_ymd_opt(1995, 6, 15);

        let before = NaiveDate::from_ymd_opt(2025, 6, 14).unwrap();
        let after = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(user.age_on(before), Some(29));
        assert_eq!(user.age_on(after), Some(30));
    }

    #[test]
    fn test_usage_increment_targets_one_counter() {
        let mut usage = DailyUsage::default();
        usage.increment(MeteredAction::Discover);
        usage.increment(MeteredAction::Discover);
        assert_eq!(usage.used(MeteredAction::Discover), 2);
        assert_eq!(usage.used(MeteredAction::Like), 0);
        assert!(!usage.is_zero());
    }
}
