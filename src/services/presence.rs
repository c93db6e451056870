// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Live connection registry and the events pushed over it.
//!
//! A [`ConnectionHandle`] is the sending half of a bounded channel; the
//! transport task owning the receiving half writes events to the socket.
//! Pushing never waits: a full or closed channel counts as a failed push.

use crate::models::chat::DeliveryState;
use crate::models::Message;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Events buffered per connection before pushes start failing.
const CONNECTION_BUFFER: usize = 64;

/// A chat message as seen on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessagePayload {
    pub conversation_id: String,
    pub message_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub text: String,
    pub state: DeliveryState,
    pub created_at: DateTime<Utc>,
}

impl ChatMessagePayload {
    pub fn new(conversation_id: &str, receiver_id: &str, message: &Message) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            message_id: message.id.clone(),
            sender_id: message.sender.clone(),
            receiver_id: receiver_id.to_string(),
            text: message.text.clone(),
            state: message.state(),
            created_at: message.created_at,
        }
    }
}

/// Server-to-client events, encoded as `{"event": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// New message for the receiver
    ReceiveMessage(ChatMessagePayload),
    /// Echo to the sender once the message is stored
    MessageSent(ChatMessagePayload),
    MessageDelivered {
        conversation_id: String,
        message_id: String,
        receiver_id: String,
    },
    MessagesRead {
        conversation_id: String,
        reader_id: String,
        message_ids: Vec<String>,
    },
    UnreadCount {
        conversation_id: String,
        counterpart_id: String,
        count: u32,
    },
    LikedByUser {
        user_id: String,
        name: String,
    },
    MutualLike {
        user_id: String,
    },
    UserUnliked {
        user_id: String,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Push endpoint for one live connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
}

impl ConnectionHandle {
    /// New handle plus the receiver the transport drains.
    pub fn new() -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue `event` without waiting. Returns `false` if it could not be queued.
    pub fn push(&self, event: ServerEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection = %self.id, "Connection buffer full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

/// Process-local map of who is connected where. One handle per user.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_user: DashMap<String, ConnectionHandle>,
    by_connection: DashMap<Uuid, String>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `user_id` to `handle`, replacing any earlier connection.
    ///
    /// Returns the handle that was replaced.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.by_connection.insert(handle.id, user_id.to_string());
        let previous = self.by_user.insert(user_id.to_string(), handle.clone());

        if let Some(prev) = &previous {
            if prev.id != handle.id {
                self.by_connection.remove(&prev.id);
                tracing::debug!(user_id, replaced = %prev.id, "Connection replaced");
            }
        }

        tracing::debug!(user_id, connection = %handle.id, "Connection registered");
        previous
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.by_user.get(user_id).map(|h| h.clone())
    }

    /// Drop `handle`, but only if it is still the user's current connection.
    ///
    /// Returns `true` if a mapping was removed.
    pub fn unregister(&self, handle: &ConnectionHandle) -> bool {
        let Some((_, user_id)) = self.by_connection.remove(&handle.id) else {
            return false;
        };

        let removed = self
            .by_user
            .remove_if(&user_id, |_, current| current.id == handle.id)
            .is_some();

        if removed {
            tracing::debug!(user_id, connection = %handle.id, "Connection unregistered");
        }
        removed
    }

    /// Push to the user's current connection. `false` if offline or the push failed.
    pub fn push_to(&self, user_id: &str, event: ServerEvent) -> bool {
        match self.lookup(user_id) {
            Some(handle) => handle.push(event),
            None => false,
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.by_user.contains_key(user_id)
    }

    pub fn online_count(&self) -> usize {
        self.by_user.len()
    }
}
