// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod chat;
pub mod discovery;
pub mod entitlement;
pub mod presence;
pub mod scheduler;
pub mod shown;
pub mod social;

pub use chat::ChatService;
pub use discovery::DiscoveryService;
pub use entitlement::EntitlementService;
pub use presence::{ConnectionHandle, ConnectionRegistry, ServerEvent};
pub use shown::ShownSetTracker;
pub use social::SocialService;
