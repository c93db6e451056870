// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Directed social edges between users (like, dislike, block, report).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kinds of pairwise edges. At most one edge of each kind per ordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Like,
    Dislike,
    Block,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Like => "like",
            EdgeKind::Dislike => "dislike",
            EdgeKind::Block => "block",
        }
    }
}

/// A directed edge `user_id -> target_user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub user_id: String,
    pub target_user_id: String,
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(user_id: &str, target_user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            target_user_id: target_user_id.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Document ID; makes the pair the uniqueness key.
    pub fn doc_id(&self) -> String {
        edge_doc_id(&self.user_id, &self.target_user_id)
    }
}

pub fn edge_doc_id(user_id: &str, target_user_id: &str) -> String {
    format!("{}_{}", user_id, target_user_id)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportReason {
    Spam,
    Harassment,
    FakeProfile,
    InappropriateContent,
    Scam,
    Other,
}

impl ReportReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportReason::Spam => "spam",
            ReportReason::Harassment => "harassment",
            ReportReason::FakeProfile => "fake_profile",
            ReportReason::InappropriateContent => "inappropriate_content",
            ReportReason::Scam => "scam",
            ReportReason::Other => "other",
        }
    }
}

impl FromStr for ReportReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spam" => Ok(ReportReason::Spam),
            "harassment" => Ok(ReportReason::Harassment),
            "fake_profile" => Ok(ReportReason::FakeProfile),
            "inappropriate_content" => Ok(ReportReason::InappropriateContent),
            "scam" => Ok(ReportReason::Scam),
            "other" => Ok(ReportReason::Other),
            _ => Err(
                "Reason must be one of: spam, harassment, fake_profile, inappropriate_content, scam, or other."
                    .to_string(),
            ),
        }
    }
}

/// A report of `reported_user_id` by `reporter_id`.
///
/// Unique per (reporter, reported, reason): the same reporter may file
/// several reports against one user as long as the reasons differ.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub reporter_id: String,
    pub reported_user_id: String,
    pub reason: ReportReason,
    #[serde(default)]
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl Report {
    pub fn doc_id(&self) -> String {
        format!(
            "{}_{}_{}",
            self.reporter_id,
            self.reported_user_id,
            self.reason.as_str()
        )
    }
}
