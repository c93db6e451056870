// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat delivery.
//!
//! The store is the source of truth. A message is appended first, then
//! pushed; a push that fails leaves the persisted state as it is, and the
//! receiver's next connect delivers whatever is still pending.

use crate::db::Store;
use crate::error::{AppError, ForbiddenReason, Result};
use crate::models::{Conversation, Message, ProfileCard};
use crate::services::presence::{ChatMessagePayload, ConnectionRegistry, ServerEvent};
use crate::services::social::{mutual_like_exists, validate_user_id};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const MAX_MESSAGE_LEN: usize = 2000;

/// Result of a send, as reported to the sender.
#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub message: ChatMessagePayload,
    /// Whether the receiver's live connection got the message
    pub delivered: bool,
}

/// Result of opening a conversation.
#[derive(Debug, Clone, Serialize)]
pub struct OpenOutcome {
    pub conversation_id: String,
    /// Messages that became read just now
    pub marked_read: Vec<String>,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub counterpart: ProfileCard,
    pub last_message: Option<ChatMessagePayload>,
    pub unread_count: u32,
    pub updated_at: DateTime<Utc>,
}

pub struct ChatService {
    db: Arc<dyn Store>,
    connections: Arc<ConnectionRegistry>,
}

impl ChatService {
    pub fn new(db: Arc<dyn Store>, connections: Arc<ConnectionRegistry>) -> Self {
        Self { db, connections }
    }

    fn check_pair(user_id: &str, counterpart_id: &str) -> Result<()> {
        validate_user_id(user_id)?;
        validate_user_id(counterpart_id)?;
        if user_id == counterpart_id {
            return Err(AppError::Forbidden(ForbiddenReason::SelfAction));
        }
        Ok(())
    }

    /// Store a message and try to deliver it right away.
    pub async fn send_message(
        &self,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
    ) -> Result<SendOutcome> {
        Self::check_pair(sender_id, receiver_id)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::BadRequest("Message text is required".to_string()));
        }
        if text.chars().count() > MAX_MESSAGE_LEN {
            return Err(AppError::BadRequest(format!(
                "Message text exceeds {} characters",
                MAX_MESSAGE_LEN
            )));
        }

        if self.db.get_user(receiver_id).await?.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", receiver_id)));
        }

        if !mutual_like_exists(self.db.as_ref(), sender_id, receiver_id).await? {
            tracing::info!(sender_id, receiver_id, "Chat refused without mutual like");
            return Err(AppError::Forbidden(ForbiddenReason::MutualLikeRequired));
        }

        let mut message = Message::new(sender_id, text);
        let conversation_id = Conversation::id_for(sender_id, receiver_id);
        self.db
            .append_message(sender_id, receiver_id, &message)
            .await?;

        self.connections.push_to(
            sender_id,
            ServerEvent::MessageSent(ChatMessagePayload::new(
                &conversation_id,
                receiver_id,
                &message,
            )),
        );

        let delivered = self
            .try_deliver(&conversation_id, receiver_id, &mut message)
            .await;

        tracing::info!(
            sender_id,
            receiver_id,
            message_id = %message.id,
            delivered,
            "Message sent"
        );

        Ok(SendOutcome {
            message: ChatMessagePayload::new(&conversation_id, receiver_id, &message),
            delivered,
        })
    }

    /// Push to the receiver if connected, then record delivery. Best effort.
    async fn try_deliver(
        &self,
        conversation_id: &str,
        receiver_id: &str,
        message: &mut Message,
    ) -> bool {
        let Some(handle) = self.connections.lookup(receiver_id) else {
            return false;
        };

        let event = ServerEvent::ReceiveMessage(ChatMessagePayload::new(
            conversation_id,
            receiver_id,
            message,
        ));
        if !handle.push(event) {
            tracing::debug!(receiver_id, message_id = %message.id, "Push to receiver failed");
            return false;
        }

        match self.db.mark_delivered(conversation_id, &message.id).await {
            // Already read by a concurrent open; the read receipt supersedes this one.
            Ok(false) => true,
            Ok(true) => {
                message.mark_delivered();
                self.connections.push_to(
                    &message.sender,
                    ServerEvent::MessageDelivered {
                        conversation_id: conversation_id.to_string(),
                        message_id: message.id.clone(),
                        receiver_id: receiver_id.to_string(),
                    },
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    message_id = %message.id,
                    "Failed to record delivery; will retry on reconnect"
                );
                false
            }
        }
    }

    /// Deliver everything that arrived while `user_id` was offline.
    ///
    /// Returns how many messages changed to delivered.
    pub async fn on_user_connected(&self, user_id: &str) -> Result<usize> {
        let conversations = self.db.conversations_for(user_id).await?;
        let mut delivered = 0;

        for conversation in conversations {
            let pending = conversation
                .messages
                .iter()
                .any(|m| m.sender != user_id && !m.is_delivered());

            if pending {
                let newly = self.db.deliver_pending(&conversation.id, user_id).await?;
                for message in &newly {
                    self.connections.push_to(
                        &message.sender,
                        ServerEvent::MessageDelivered {
                            conversation_id: conversation.id.clone(),
                            message_id: message.id.clone(),
                            receiver_id: user_id.to_string(),
                        },
                    );
                }
                delivered += newly.len();
            }

            let unread = conversation.unread_count_for(user_id);
            if unread > 0 {
                if let Some(counterpart) = conversation.counterpart_of(user_id) {
                    self.connections.push_to(
                        user_id,
                        ServerEvent::UnreadCount {
                            conversation_id: conversation.id.clone(),
                            counterpart_id: counterpart.to_string(),
                            count: unread,
                        },
                    );
                }
            }
        }

        if delivered > 0 {
            tracing::info!(user_id, delivered, "Delivered pending messages");
        }
        Ok(delivered)
    }

    /// Mark the counterpart's messages read. A second open changes nothing.
    pub async fn open_conversation(&self, user_id: &str, counterpart_id: &str) -> Result<OpenOutcome> {
        Self::check_pair(user_id, counterpart_id)?;

        let conversation_id = Conversation::id_for(user_id, counterpart_id);
        let marked = self
            .db
            .mark_read(&conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        if !marked.is_empty() {
            tracing::debug!(user_id, counterpart_id, count = marked.len(), "Messages read");
            self.connections.push_to(
                counterpart_id,
                ServerEvent::MessagesRead {
                    conversation_id: conversation_id.clone(),
                    reader_id: user_id.to_string(),
                    message_ids: marked.clone(),
                },
            );
            self.connections.push_to(
                user_id,
                ServerEvent::UnreadCount {
                    conversation_id: conversation_id.clone(),
                    counterpart_id: counterpart_id.to_string(),
                    count: 0,
                },
            );
        }

        Ok(OpenOutcome {
            conversation_id,
            marked_read: marked,
            unread_count: 0,
        })
    }

    pub async fn unread_count(&self, user_id: &str, counterpart_id: &str) -> Result<u32> {
        let conversation = self
            .db
            .get_conversation(&Conversation::id_for(user_id, counterpart_id))
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;
        Ok(conversation.unread_count_for(user_id))
    }

    /// Conversations for `user_id`, most recently active first.
    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<ConversationSummary>> {
        let mut conversations = self.db.conversations_for(user_id).await?;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let today = Utc::now().date_naive();
        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let Some(counterpart_id) = conversation.counterpart_of(user_id) else {
                continue;
            };
            let counterpart = match self.db.get_user(counterpart_id).await? {
                Some(user) => ProfileCard::from_user(&user, today),
                None => continue,
            };

            summaries.push(ConversationSummary {
                last_message: conversation.last_message().map(|m| {
                    let receiver = if m.sender == user_id {
                        counterpart_id
                    } else {
                        user_id
                    };
                    ChatMessagePayload::new(&conversation.id, receiver, m)
                }),
                unread_count: conversation.unread_count_for(user_id),
                conversation_id: conversation.id.clone(),
                updated_at: conversation.updated_at,
                counterpart,
            });
        }
        Ok(summaries)
    }

    /// One page of history, newest first. Requires a mutual like.
    pub async fn history(
        &self,
        user_id: &str,
        counterpart_id: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<ChatMessagePayload>> {
        Self::check_pair(user_id, counterpart_id)?;

        if !mutual_like_exists(self.db.as_ref(), user_id, counterpart_id).await? {
            return Err(AppError::Forbidden(ForbiddenReason::MutualLikeRequired));
        }

        let conversation_id = Conversation::id_for(user_id, counterpart_id);
        let Some(conversation) = self.db.get_conversation(&conversation_id).await? else {
            return Ok(Vec::new());
        };

        let skip = (page.max(1) as usize - 1).saturating_mul(per_page as usize);
        Ok(conversation
            .messages
            .iter()
            .rev()
            .skip(skip)
            .take(per_page as usize)
            .map(|m| {
                let receiver = if m.sender == user_id {
                    counterpart_id
                } else {
                    user_id
                };
                ChatMessagePayload::new(&conversation_id, receiver, m)
            })
            .collect())
    }
}
