//! Database layer.
//!
//! [`Store`] is the seam between the domain services and persistence.
//! [`FirestoreDb`] backs production; [`MemoryDb`] backs local runs and tests.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{
    Conversation, DiscoverySection, Edge, EdgeKind, Limit, Message, MeteredAction, Plan, PlanName,
    Report, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const PLANS: &str = "plans";
    pub const LIKES: &str = "likes";
    pub const DISLIKES: &str = "dislikes";
    pub const BLOCKS: &str = "blocks";
    pub const REPORTS: &str = "reports";
    /// One document per participant pair, messages embedded
    pub const CONVERSATIONS: &str = "conversations";

    use crate::models::EdgeKind;

    pub fn for_edge(kind: EdgeKind) -> &'static str {
        match kind {
            EdgeKind::Like => LIKES,
            EdgeKind::Dislike => DISLIKES,
            EdgeKind::Block => BLOCKS,
        }
    }
}

/// Durable state used by the domain services.
///
/// Methods that mutate a single document are expected to be atomic with
/// respect to other calls on the same document where the backend allows it.
#[async_trait]
pub trait Store: Send + Sync {
    // ─── Users ───────────────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError>;

    async fn upsert_user(&self, user: &User) -> Result<(), AppError>;

    async fn list_verified_users(&self) -> Result<Vec<User>, AppError>;

    /// Set plan and expiry. Errors with `NotFound` for unknown users.
    async fn set_user_plan(
        &self,
        user_id: &str,
        plan: PlanName,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), AppError>;

    /// Unconditionally add one use of `action`.
    async fn increment_usage(&self, user_id: &str, action: MeteredAction) -> Result<(), AppError>;

    /// Add one use of `action` only if `limit` still allows it.
    ///
    /// Returns `false` (and changes nothing) when the quota is used up.
    async fn reserve_usage(
        &self,
        user_id: &str,
        action: MeteredAction,
        limit: Limit,
    ) -> Result<bool, AppError>;

    /// Zero every user's counters. Returns how many documents changed.
    async fn reset_all_usage(&self) -> Result<usize, AppError>;

    /// Append IDs to a shown-set, skipping ones already present.
    async fn add_shown(
        &self,
        user_id: &str,
        section: DiscoverySection,
        shown_ids: &[String],
    ) -> Result<(), AppError>;

    // ─── Plans ───────────────────────────────────────────────────

    async fn get_plan(&self, name: PlanName) -> Result<Option<Plan>, AppError>;

    async fn list_plans(&self) -> Result<Vec<Plan>, AppError>;

    async fn upsert_plan(&self, plan: &Plan) -> Result<(), AppError>;

    // ─── Edges ───────────────────────────────────────────────────

    /// Insert if absent. Returns `false` if the pair already had this edge.
    async fn insert_edge(&self, kind: EdgeKind, edge: &Edge) -> Result<bool, AppError>;

    async fn edge_exists(&self, kind: EdgeKind, from: &str, to: &str) -> Result<bool, AppError>;

    /// Returns `false` if there was nothing to delete.
    async fn delete_edge(&self, kind: EdgeKind, from: &str, to: &str) -> Result<bool, AppError>;

    async fn edges_from(&self, kind: EdgeKind, user_id: &str) -> Result<Vec<Edge>, AppError>;

    async fn edges_to(&self, kind: EdgeKind, user_id: &str) -> Result<Vec<Edge>, AppError>;

    /// Insert if absent. Returns `false` for a repeat of the same reason.
    async fn insert_report(&self, report: &Report) -> Result<bool, AppError>;

    async fn reports_by(&self, reporter_id: &str) -> Result<Vec<Report>, AppError>;

    // ─── Conversations ───────────────────────────────────────────

    /// Append to the pair's conversation, creating it on first message.
    async fn append_message(
        &self,
        sender: &str,
        receiver: &str,
        message: &Message,
    ) -> Result<(), AppError>;

    async fn get_conversation(&self, conversation_id: &str)
        -> Result<Option<Conversation>, AppError>;

    async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>, AppError>;

    /// `Sent -> Delivered` for one message. Returns `false` if nothing changed.
    async fn mark_delivered(&self, conversation_id: &str, message_id: &str)
        -> Result<bool, AppError>;

    /// Deliver all pending messages addressed to `recipient`, persisting once.
    async fn deliver_pending(
        &self,
        conversation_id: &str,
        recipient: &str,
    ) -> Result<Vec<Message>, AppError>;

    /// Mark the counterpart's messages read for `reader`, persisting once.
    ///
    /// Returns `None` if the conversation does not exist.
    async fn mark_read(
        &self,
        conversation_id: &str,
        reader: &str,
    ) -> Result<Option<Vec<String>>, AppError>;
}
