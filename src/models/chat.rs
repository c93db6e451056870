// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Conversations and the per-message delivery state machine.
//!
//! A message moves `Sent -> Delivered -> Read` and never backwards. The
//! `delivered`/`read` flags are private so the only way to change them is
//! through the forward transitions below.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    /// Persisted; the receiver has not been reached yet.
    Sent,
    /// Pushed to a live connection of the receiver.
    Delivered,
    /// The receiver opened the conversation.
    Read,
}

/// One chat message, embedded in its conversation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender: String,
    pub text: String,
    #[serde(default)]
    delivered: bool,
    #[serde(default)]
    read: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: &str, text: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            delivered: false,
            read: false,
            created_at: Utc::now(),
        }
    }

    pub fn state(&self) -> DeliveryState {
        if self.read {
            DeliveryState::Read
        } else if self.delivered {
            DeliveryState::Delivered
        } else {
            DeliveryState::Sent
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered
    }

    pub fn is_read(&self) -> bool {
        self.read
    }

    /// `Sent -> Delivered`. Returns `false` if already delivered or read.
    pub fn mark_delivered(&mut self) -> bool {
        self.advance_to(DeliveryState::Delivered)
    }

    /// `* -> Read`. Reading implies delivery. Returns `false` if already read.
    pub fn mark_read(&mut self) -> bool {
        self.advance_to(DeliveryState::Read)
    }

    fn advance_to(&mut self, target: DeliveryState) -> bool {
        if target <= self.state() {
            return false;
        }
        match target {
            DeliveryState::Sent => return false,
            DeliveryState::Delivered => self.delivered = true,
            DeliveryState::Read => {
                self.delivered = true;
                self.read = true;
            }
        }
        true
    }
}

/// All messages between one unordered pair of users.
///
/// Stored in the `conversations` collection under [`Conversation::id_for`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Both participants, sorted. Fixed at creation.
    pub participants: Vec<String>,
    /// Append-only, in store order.
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Document ID for the pair, independent of argument order.
    pub fn id_for(a: &str, b: &str) -> String {
        if a <= b {
            format!("{}_{}", a, b)
        } else {
            format!("{}_{}", b, a)
        }
    }

    pub fn new(a: &str, b: &str) -> Self {
        let mut participants = vec![a.to_string(), b.to_string()];
        participants.sort();
        let now = Utc::now();
        Self {
            id: Self::id_for(a, b),
            participants,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn includes(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The other participant, if `user_id` takes part.
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        if !self.includes(user_id) {
            return None;
        }
        self.participants
            .iter()
            .find(|p| p.as_str() != user_id)
            .map(String::as_str)
    }

    pub fn push(&mut self, message: Message) {
        self.updated_at = message.created_at;
        self.messages.push(message);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Mark one message delivered. Returns `false` if unknown or already past `Sent`.
    pub fn mark_delivered(&mut self, message_id: &str) -> bool {
        self.messages
            .iter_mut()
            .find(|m| m.id == message_id)
            .is_some_and(Message::mark_delivered)
    }

    /// Deliver every undelivered message addressed to `recipient`.
    ///
    /// Returns the messages that changed state.
    pub fn deliver_pending_for(&mut self, recipient: &str) -> Vec<Message> {
        self.messages
            .iter_mut()
            .filter(|m| m.sender != recipient)
            .filter_map(|m| m.mark_delivered().then(|| m.clone()))
            .collect()
    }

    /// Mark everything the counterpart sent to `reader` as read.
    ///
    /// Returns IDs of messages that changed state.
    pub fn mark_read_by(&mut self, reader: &str) -> Vec<String> {
        self.messages
            .iter_mut()
            .filter(|m| m.sender != reader)
            .filter_map(|m| m.mark_read().then(|| m.id.clone()))
            .collect()
    }

    /// Unread messages from `viewer`'s point of view. Always derived.
    pub fn unread_count_for(&self, viewer: &str) -> u32 {
        let count = self
            .messages
            .iter()
            .filter(|m| m.sender != viewer && !m.is_read())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}
