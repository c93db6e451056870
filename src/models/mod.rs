// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod chat;
pub mod edge;
pub mod plan;
pub mod user;

pub use chat::{Conversation, DeliveryState, Message};
pub use edge::{Edge, EdgeKind, Report, ReportReason};
pub use plan::{Limit, MeteredAction, Plan, PlanName};
pub use user::{DailyUsage, DiscoverySection, Gender, ProfileCard, ShowMe, ShownSets, User};
