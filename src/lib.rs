// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Matchify: entitlement, discovery and chat backend for a dating app.
//!
//! This crate meters plan-limited actions, tracks which profiles each user
//! has already been shown, and relays chat messages over WebSockets with
//! delivery and read receipts.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::Store;
use services::{
    ChatService, ConnectionRegistry, DiscoveryService, EntitlementService, SocialService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Arc<dyn Store>,
    pub connections: Arc<ConnectionRegistry>,
    pub entitlements: Arc<EntitlementService>,
    pub social: SocialService,
    pub discovery: DiscoveryService,
    pub chat: ChatService,
}

impl AppState {
    pub fn new(config: Config, db: Arc<dyn Store>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        let entitlements = Arc::new(EntitlementService::new(
            db.clone(),
            config.plan_duration_days,
        ));

        Self {
            social: SocialService::new(db.clone(), entitlements.clone(), connections.clone()),
            discovery: DiscoveryService::new(db.clone(), entitlements.clone()),
            chat: ChatService::new(db.clone(), connections.clone()),
            config,
            db,
            connections,
            entitlements,
        }
    }
}
