// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing [`Store`].
//!
//! Document layout:
//! - `users/{user_id}` with embedded `plan`, `usage` and `shown`
//! - `plans/{PLAN_NAME}`
//! - `likes|dislikes|blocks/{user_id}_{target_user_id}`
//! - `reports/{reporter_id}_{reported_user_id}_{reason}`
//! - `conversations/{a}_{b}` with embedded messages

use crate::db::{collections, Store};
use crate::error::AppError;
use crate::models::edge::edge_doc_id;
use crate::models::{
    Conversation, DiscoverySection, Edge, EdgeKind, Limit, Message, MeteredAction, Plan, PlanName,
    Report, User,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::errors::FirestoreError;
use firestore::{paths, FirestoreConsistencySelector};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

// Commits aborted by contention are retried this many times in total.
const MAX_TRANSACTION_ATTEMPTS: u32 = 5;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Emulator connection with a dummy bearer token.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client. Every operation returns `AppError::Database`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    // ─── Generic document helpers ───────────────────────────────

    async fn get_doc<T>(&self, collection: &str, doc_id: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj()
            .one(doc_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_doc<T>(&self, collection: &str, doc_id: &str, doc: &T) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collection)
            .document_id(doc_id)
            .object(doc)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Create-only write. Returns `false` if the document already exists.
    async fn insert_doc<T>(&self, collection: &str, doc_id: &str, doc: &T) -> Result<bool, AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
    {
        let result: Result<T, FirestoreError> = self
            .get_client()?
            .fluent()
            .insert()
            .into(collection)
            .document_id(doc_id)
            .object(doc)
            .execute()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(FirestoreError::DataConflictError(_)) => Ok(false),
            Err(e) => Err(AppError::Database(e.to_string())),
        }
    }

    async fn query_eq<T>(&self, collection: &str, field: &str, value: &str) -> Result<Vec<T>, AppError>
    where
        T: DeserializeOwned + Send,
    {
        self.get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(|q| q.for_all([q.field(field).eq(value)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Read a document inside a transaction, change it in memory, and write
    /// back only `fields`.
    ///
    /// `apply` returns its result plus whether the document changed. Nothing
    /// is written when it did not. The read is bound to the transaction, so a
    /// concurrent writer makes the read or commit abort. Aborted attempts are
    /// retried against a fresh read up to `MAX_TRANSACTION_ATTEMPTS` times.
    ///
    /// Returns `None` without writing when the document does not exist.
    async fn modify_doc<T, R, F>(
        &self,
        collection: &str,
        doc_id: &str,
        fields: &[String],
        mut apply: F,
    ) -> Result<Option<R>, AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        R: Send,
        F: FnMut(&mut T) -> (R, bool) + Send,
    {
        let client = self.get_client()?;
        let mut attempt = 1;

        loop {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            let reader = client.clone_with_consistency_selector(
                FirestoreConsistencySelector::Transaction(transaction.transaction_id().clone()),
            );
            let read: Result<Option<T>, FirestoreError> = reader
                .fluent()
                .select()
                .by_id_in(collection)
                .obj()
                .one(doc_id)
                .await;
            let current = match read {
                Ok(current) => current,
                Err(e) if is_contention(&e) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    let _ = transaction.rollback().await;
                    tracing::debug!(
                        collection,
                        doc_id,
                        attempt,
                        "Transactional read contended, retrying"
                    );
                    backoff(attempt).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(AppError::Database(e.to_string())),
            };

            let Some(mut doc) = current else {
                let _ = transaction.rollback().await;
                return Ok(None);
            };

            let (result, changed) = apply(&mut doc);
            if !changed {
                let _ = transaction.rollback().await;
                return Ok(Some(result));
            }

            client
                .fluent()
                .update()
                .fields(fields)
                .in_col(collection)
                .document_id(doc_id)
                .object(&doc)
                .add_to_transaction(&mut transaction)
                .map_err(|e| {
                    AppError::Database(format!(
                        "Failed to add {} update to transaction: {}",
                        collection, e
                    ))
                })?;

            match transaction.commit().await {
                Ok(_) => return Ok(Some(result)),
                Err(e) if is_contention(&e) && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::debug!(
                        collection,
                        doc_id,
                        attempt,
                        "Transaction aborted by a concurrent write, retrying"
                    );
                    backoff(attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(AppError::Database(format!(
                        "Transaction commit failed: {}",
                        e
                    )))
                }
            }
        }
    }

    async fn modify_user<R: Send>(
        &self,
        user_id: &str,
        fields: &[String],
        apply: impl FnMut(&mut User) -> (R, bool) + Send,
    ) -> Result<R, AppError> {
        self.modify_doc(collections::USERS, user_id, fields, apply)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    async fn modify_conversation<R: Send>(
        &self,
        conversation_id: &str,
        apply: impl FnMut(&mut Conversation) -> (R, bool) + Send,
    ) -> Result<Option<R>, AppError> {
        self.modify_doc(
            collections::CONVERSATIONS,
            conversation_id,
            &paths!(Conversation::{messages, updated_at}),
            apply,
        )
        .await
    }

    /// Write `fields` of each document in transactions of at most `BATCH_SIZE` each.
    async fn batch_set<T, F>(
        &self,
        items: &[T],
        collection: &str,
        fields: &[String],
        id_extractor: F,
    ) -> Result<(), AppError>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Fn(&T) -> String + Send + Sync,
    {
        let client = self.get_client()?;

        for chunk in items.chunks(BATCH_SIZE) {
            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

            for item in chunk {
                let doc_id = id_extractor(item);
                client
                    .fluent()
                    .update()
                    .fields(fields)
                    .in_col(collection)
                    .document_id(&doc_id)
                    .object(item)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        AppError::Database(format!(
                            "Failed to add write to transaction for {}: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction
                .commit()
                .await
                .map_err(|e| AppError::Database(format!("Failed to commit batch write: {}", e)))?;
        }

        Ok(())
    }
}

fn is_contention(e: &FirestoreError) -> bool {
    matches!(e, FirestoreError::DatabaseError(db_err) if db_err.retry_possible)
}

async fn backoff(attempt: u32) {
    tokio::time::sleep(Duration::from_millis(25 * u64::from(attempt))).await;
}

#[async_trait]
impl Store for FirestoreDb {
    // ─── User Operations ─────────────────────────────────────────

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        self.get_doc(collections::USERS, user_id).await
    }

    async fn upsert_user(&self, user: &User) -> Result<(), AppError> {
        self.set_doc(collections::USERS, &user.id, user).await
    }

    async fn list_verified_users(&self) -> Result<Vec<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(|q| q.for_all([q.field("is_verified").eq(true)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_user_plan(
        &self,
        user_id: &str,
        plan: PlanName,
        expiry: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        self.modify_user(user_id, &paths!(User::{plan, plan_expiry}), |user| {
            user.plan = plan;
            user.plan_expiry = expiry;
            ((), true)
        })
        .await
    }

    async fn increment_usage(&self, user_id: &str, action: MeteredAction) -> Result<(), AppError> {
        self.modify_user(user_id, &paths!(User::{usage}), |user| {
            user.usage.increment(action);
            ((), true)
        })
        .await
    }

    async fn reserve_usage(
        &self,
        user_id: &str,
        action: MeteredAction,
        limit: Limit,
    ) -> Result<bool, AppError> {
        self.modify_user(user_id, &paths!(User::{usage}), |user| {
            let allowed = limit.allows(user.usage.used(action));
            if allowed {
                user.usage.increment(action);
            }
            (allowed, allowed)
        })
        .await
    }

    async fn reset_all_usage(&self) -> Result<usize, AppError> {
        let users: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let dirty: Vec<User> = users
            .into_iter()
            .filter(|u| !u.usage.is_zero())
            .map(|mut u| {
                u.usage = Default::default();
                u
            })
            .collect();

        // Only the usage field is written, so plan changes made since the
        // query are kept.
        self.batch_set(
            &dirty,
            collections::USERS,
            &paths!(User::{usage}),
            |u: &User| u.id.clone(),
        )
        .await?;

        Ok(dirty.len())
    }

    async fn add_shown(
        &self,
        user_id: &str,
        section: DiscoverySection,
        shown_ids: &[String],
    ) -> Result<(), AppError> {
        self.modify_user(user_id, &paths!(User::{shown}), |user| {
            let mut changed = false;
            for id in shown_ids {
                changed |= user.shown.insert(section, id);
            }
            ((), changed)
        })
        .await
    }

    // ─── Plan Operations ─────────────────────────────────────────

    async fn get_plan(&self, name: PlanName) -> Result<Option<Plan>, AppError> {
        self.get_doc(collections::PLANS, name.as_str()).await
    }

    async fn list_plans(&self) -> Result<Vec<Plan>, AppError> {
        let mut plans: Vec<Plan> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::PLANS)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        plans.sort_by_key(|p| p.price_cents);
        Ok(plans)
    }

    async fn upsert_plan(&self, plan: &Plan) -> Result<(), AppError> {
        self.set_doc(collections::PLANS, plan.name.as_str(), plan)
            .await
    }

    // ─── Edge Operations ─────────────────────────────────────────

    async fn insert_edge(&self, kind: EdgeKind, edge: &Edge) -> Result<bool, AppError> {
        self.insert_doc(collections::for_edge(kind), &edge.doc_id(), edge)
            .await
    }

    async fn edge_exists(&self, kind: EdgeKind, from: &str, to: &str) -> Result<bool, AppError> {
        let edge: Option<Edge> = self
            .get_doc(collections::for_edge(kind), &edge_doc_id(from, to))
            .await?;
        Ok(edge.is_some())
    }

    async fn delete_edge(&self, kind: EdgeKind, from: &str, to: &str) -> Result<bool, AppError> {
        if !self.edge_exists(kind, from, to).await? {
            return Ok(false);
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::for_edge(kind))
            .document_id(edge_doc_id(from, to))
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }

    async fn edges_from(&self, kind: EdgeKind, user_id: &str) -> Result<Vec<Edge>, AppError> {
        self.query_eq(collections::for_edge(kind), "user_id", user_id)
            .await
    }

    async fn edges_to(&self, kind: EdgeKind, user_id: &str) -> Result<Vec<Edge>, AppError> {
        self.query_eq(collections::for_edge(kind), "target_user_id", user_id)
            .await
    }

    async fn insert_report(&self, report: &Report) -> Result<bool, AppError> {
        self.insert_doc(collections::REPORTS, &report.doc_id(), report)
            .await
    }

    async fn reports_by(&self, reporter_id: &str) -> Result<Vec<Report>, AppError> {
        self.query_eq(collections::REPORTS, "reporter_id", reporter_id)
            .await
    }

    // ─── Conversation Operations ─────────────────────────────────

    async fn append_message(
        &self,
        sender: &str,
        receiver: &str,
        message: &Message,
    ) -> Result<(), AppError> {
        let conversation_id = Conversation::id_for(sender, receiver);
        let appended = self
            .modify_conversation(&conversation_id, |c| {
                c.push(message.clone());
                ((), true)
            })
            .await?;
        if appended.is_some() {
            return Ok(());
        }

        let mut conversation = Conversation::new(sender, receiver);
        conversation.push(message.clone());
        if self
            .insert_doc(collections::CONVERSATIONS, &conversation_id, &conversation)
            .await?
        {
            return Ok(());
        }

        // Lost the creation race; the document exists now.
        self.modify_conversation(&conversation_id, |c| {
            c.push(message.clone());
            ((), true)
        })
        .await?
        .ok_or_else(|| AppError::Database(format!("Conversation {} vanished", conversation_id)))
    }

    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, AppError> {
        self.get_doc(collections::CONVERSATIONS, conversation_id)
            .await
    }

    async fn conversations_for(&self, user_id: &str) -> Result<Vec<Conversation>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::CONVERSATIONS)
            .filter(|q| q.for_all([q.field("participants").array_contains(user_id)]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn mark_delivered(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .modify_conversation(conversation_id, |c| {
                let delivered = c.mark_delivered(message_id);
                (delivered, delivered)
            })
            .await?
            .unwrap_or(false))
    }

    async fn deliver_pending(
        &self,
        conversation_id: &str,
        recipient: &str,
    ) -> Result<Vec<Message>, AppError> {
        Ok(self
            .modify_conversation(conversation_id, |c| {
                let delivered = c.deliver_pending_for(recipient);
                let changed = !delivered.is_empty();
                (delivered, changed)
            })
            .await?
            .unwrap_or_default())
    }

    async fn mark_read(
        &self,
        conversation_id: &str,
        reader: &str,
    ) -> Result<Option<Vec<String>>, AppError> {
        self.modify_conversation(conversation_id, |c| {
            let read = c.mark_read_by(reader);
            let changed = !read.is_empty();
            (read, changed)
        })
        .await
    }
}
