// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process [`Store`] for local development and tests.
//!
//! Each collection is a `DashMap` keyed by the same document IDs Firestore
//! uses. Single-document updates run under the entry's shard lock, so
//! conditional increments and appends are atomic.

use crate::db::Store;
use crate::error::AppError;
use crate::models::edge::edge_doc_id;
use crate::models::{
    Conversation, DiscoverySection, Edge, EdgeKind, Limit, Message, MeteredAction, Plan, PlanName,
    Report, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryDb {
    users: DashMap<String, User>,
    plans: DashMap<PlanName, Plan>,
    edges: DashMap<(EdgeKind, String), Edge>,
    reports: DashMap<String, Report>,
    conversations: DashMap<String, Conversation>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&mut User) -> T) -> Result<T, AppError> {
        let mut user = self
            .users
            .get_mut(user_id)
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))?;
        Ok(f(&mut user))
    }

    fn with_conversation<T>(
        &self,
        conversation_id: &str,
        f: impl FnOnce(&mut Conversation) -> T,
    ) -> Option<T> {
        self.conversations
            .get_mut(conversation_id)
            .map(|mut conversation| f(&mut conversation))
    }
}

#[async_trait]
impl Store for MemoryDb {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(user_id).map(|u| u.clone()))
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn list_verified_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self
            .users
            .iter()
            .filter(|u| u.is_verified)
            .map(|u| u.clone())
            .collect())
    }

    async fn set_user_plan(
        &self,
        user_id: &str,
        plan: PlanName,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.with_user(user_id, |user| {
            user.plan = plan;
            user.plan_expiry = expiry;
        })
    }

    async fn increment_usage(&self, user_id: &str, action: MeteredAction) -> Result<(), AppError> {
        self.with_user(user_id, |user| user.usage.increment(action))
    }

    async fn reserve_usage(
        &self,
        user_id: &str,
        action: MeteredAction,
        limit: Limit,
    ) -> Result<bool, AppError> {
        self.with_user(user_id, |user| {
            if !limit.allows(user.usage.used(action)) {
                return false;
            }
            user.usage.increment(action);
            true
        })
    }

    async fn reset_all_usage(&self) -> Result<usize, AppError> {
        let mut changed = 0;
        for mut user in self.users.iter_mut() {
            if !user.usage.is_zero() {
                user.usage = Default::default();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn add_shown(
        &self,
        user_id: &str,
        section: DiscoverySection,
        shown_ids: &[String],
    ) -> Result<(), AppError> {
        self.with_user(user_id, |user| {
            for id in shown_ids {
                user.shown.insert(section, id);
            }
        })
    }

    async fn get_plan(&self, name: PlanName) -> Result<Option<Plan>, AppError> {
        Ok(self.plans.get(&name).map(|p| p.clone()))
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, AppError> {
        let mut plans: Vec<Plan> = self.plans.iter().map(|p| p.clone()).collect();
        plans.sort_by_key(|p| p.price_cents);
        Ok(plans)
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<(), AppError> {
        self.plans.insert(plan.name, plan.clone());
        Ok(())
    }

    async fn insert_edge(&self, kind: EdgeKind, edge: &Edge) -> Result<bool, AppError> {
        match self.edges.entry((kind, edge.doc_id())) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(edge.clone());
                Ok(true)
            }
        }
    }

    async fn edge_exists(&self, kind: EdgeKind, from: &str, to: &str) -> Result<bool, AppError> {
        Ok(self.edges.contains_key(&(kind, edge_doc_id(from, to))))
    }

    async fn delete_edge(&self, kind: EdgeKind, from: &str, to: &str) -> Result<bool, AppError> {
        Ok(self.edges.remove(&(kind, edge_doc_id(from, to))).is_some())
    }

    async fn edges_from(&self, kind: EdgeKind, user_id: &str) -> Result<Vec<Edge>, AppError> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.key().0 == kind && e.user_id == user_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn edges_to(&self, kind: EdgeKind, user_id: &str) -> Result<Vec<Edge>, AppError> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.key().0 == kind && e.target_user_id == user_id)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, AppError> {
        match self.reports.entry(report.doc_id()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(report.clone());
                Ok(true)
            }
        }
    }

    async fn reports_by(&self, reporter_id: &str) -> Result<Vec<Report>, AppError> {
        Ok(self
            .reports
            .iter()
            .filter(|r| r.reporter_id == reporter_id)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn append_message(
        &self,
        sender: &str,
        receiver: &str,
        message: &Message,
    ) -> Result<(), AppError> {
        self.conversations
            .entry(Conversation::id_for(sender, receiver))
            .or_insert_with(|| Conversation::new(sender, receiver))
            .push(message.clone());
        Ok(())
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, AppError> {
        Ok(self.conversations.get(conversation_id).map(|c| c.clone()))
    }

    async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>, AppError> {
        Ok(self
            .conversations
            .iter()
            .filter(|c| c.includes(user_id))
            .map(|c| c.value().clone())
            .collect())
    }

    async fn mark_delivered(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .with_conversation(conversation_id, |c| c.mark_delivered(message_id))
            .unwrap_or(false))
    }

    async fn deliver_pending(
        &self,
        conversation_id: &str,
        recipient: &str,
    ) -> Result<Vec<Message>, AppError> {
        Ok(self
            .with_conversation(conversation_id, |c| c.deliver_pending_for(recipient))
            .unwrap_or_default())
    }

    async fn mark_read(
        &self,
        conversation_id: &str,
        reader: &str,
    ) -> Result<Option<Vec<String>>, AppError> {
        Ok(self.with_conversation(conversation_id, |c| c.mark_read_by(reader)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_stops_at_limit() {
        let db = MemoryDb::new();
        db.upsert_user(&User::new("u1", "One")).await.unwrap();

        for _ in 0..3 {
            assert!(db
                .reserve_usage("u1", MeteredAction::Like, Limit::Daily(3))
                .await
                .unwrap());
        }
        assert!(!db
            .reserve_usage("u1", MeteredAction::Like, Limit::Daily(3))
            .await
            .unwrap());

        let user = db.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.usage.daily_likes_used, 3);
    }

    #[tokio::test]
    async fn test_reserve_unknown_user_is_not_found() {
        let db = MemoryDb::new();
        let err = db
            .reserve_usage("ghost", MeteredAction::Like, Limit::Unlimited)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_edge_pair_is_unique_per_kind() {
        let db = MemoryDb::new();
        let edge = Edge::new("a", "b");

        assert!(db.insert_edge(EdgeKind::Like, &edge).await.unwrap());
        assert!(!db.insert_edge(EdgeKind::Like, &edge).await.unwrap());
        // Same pair, different kind
        assert!(db.insert_edge(EdgeKind::Block, &edge).await.unwrap());
        // Reverse direction is a different edge
        assert!(!db.edge_exists(EdgeKind::Like, "b", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_append_creates_one_conversation_per_pair() {
        let db = MemoryDb::new();
        db.append_message("a", "b", &Message::new("a", "hi"))
            .await
            .unwrap();
        db.append_message("b", "a", &Message::new("b", "hey"))
            .await
            .unwrap();

        let conversations = db.conversations_for("a").await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].messages.len(), 2);
        assert_eq!(conversations[0].messages[0].text, "hi");
    }

    #[tokio::test]
    async fn test_mark_read_on_missing_conversation() {
        let db = MemoryDb::new();
        assert_eq!(db.mark_read("a_b", "a").await.unwrap(), None);
    }
}
