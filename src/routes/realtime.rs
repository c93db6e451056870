// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Realtime WebSocket transport.
//!
//! Each socket gets a [`ConnectionHandle`]. A writer task drains the handle's
//! channel into the socket while the reader loop handles client events one
//! at a time, so one sender's messages are stored in the order sent.

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::services::presence::{ConnectionHandle, ServerEvent};
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Extension, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

/// Client-to-server events, `{"event": "...", "data": {...}}`.
///
/// Decode frames with [`ClientEvent::parse`], which accepts a missing `data`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Identity announcement. `user_id`, if present, must match the session.
    JoinUser {
        #[serde(default)]
        user_id: Option<String>,
    },
    SendMessage {
        receiver_id: String,
        text: String,
    },
    MarkRead {
        counterpart_id: String,
    },
    LikeUser {
        target_user_id: String,
    },
}

impl ClientEvent {
    /// Parse a client frame. A frame without `data` is read as `data: {}`.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        let mut frame: serde_json::Value = serde_json::from_str(text)?;
        if let Some(fields) = frame.as_object_mut() {
            fields
                .entry("data")
                .or_insert_with(|| serde_json::Value::Object(Default::default()));
        }
        serde_json::from_value(frame)
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user.user_id))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: String) {
    let (mut sink, mut stream) = socket.split();
    let (handle, mut rx) = ConnectionHandle::new();
    let connection = handle.id();

    tracing::info!(user_id = %user_id, %connection, "WebSocket connected");

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode server event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = Session {
        state: state.as_ref(),
        user_id: &user_id,
        handle: &handle,
        joined: false,
    };

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => session.handle_text(text.as_str()).await,
            Ok(Message::Close(frame)) => {
                tracing::debug!(user_id = %user_id, ?frame, "Client closed connection");
                break;
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!(user_id = %user_id, bytes = data.len(), "Ignoring binary frame");
            }
            // Ping/pong is answered by axum
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    session.close();
    writer.abort();
    tracing::info!(user_id = %user_id, %connection, "WebSocket disconnected");
}

/// Per-socket event processing.
struct Session<'a> {
    state: &'a AppState,
    user_id: &'a str,
    handle: &'a ConnectionHandle,
    joined: bool,
}

impl Session<'_> {
    async fn handle_text(&mut self, text: &str) {
        let event = match ClientEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                self.send_error("bad_request", &format!("Invalid event: {}", e));
                return;
            }
        };

        if let Err(e) = self.dispatch(event).await {
            self.send_error(e.code(), &e.details().unwrap_or_else(|| e.to_string()));
        }
    }

    async fn dispatch(&mut self, event: ClientEvent) -> Result<(), AppError> {
        if let ClientEvent::JoinUser { user_id } = &event {
            return self.join(user_id.as_deref()).await;
        }

        if !self.joined {
            return Err(AppError::BadRequest(
                "Send join-user before other events".to_string(),
            ));
        }

        match event {
            ClientEvent::JoinUser { .. } => Ok(()),
            ClientEvent::SendMessage { receiver_id, text } => {
                self.state
                    .chat
                    .send_message(self.user_id, &receiver_id, &text)
                    .await?;
                Ok(())
            }
            ClientEvent::MarkRead { counterpart_id } => {
                self.state
                    .chat
                    .open_conversation(self.user_id, &counterpart_id)
                    .await?;
                Ok(())
            }
            ClientEvent::LikeUser { target_user_id } => {
                self.state
                    .social
                    .perform_like(self.user_id, &target_user_id)
                    .await?;
                Ok(())
            }
        }
    }

    async fn join(&mut self, claimed: Option<&str>) -> Result<(), AppError> {
        if claimed.is_some_and(|claimed| claimed != self.user_id) {
            return Err(AppError::Unauthorized);
        }

        self.state
            .connections
            .register(self.user_id, self.handle.clone());
        self.joined = true;

        if let Err(e) = self.state.chat.on_user_connected(self.user_id).await {
            tracing::warn!(user_id = %self.user_id, error = %e, "Pending delivery on join failed");
        }
        Ok(())
    }

    /// Drop this socket from the registry unless a newer one replaced it.
    fn close(self) {
        self.state.connections.unregister(self.handle);
    }

    fn send_error(&self, code: &str, message: &str) {
        self.handle.push(ServerEvent::Error {
            code: code.to_string(),
            message: message.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{MemoryDb, Store};
    use crate::models::{Conversation, DeliveryState, Edge, EdgeKind, User};
    use tokio::sync::mpsc;

    async fn test_state() -> AppState {
        let db: Arc<dyn Store> = Arc::new(MemoryDb::new());
        let state = AppState::new(Config::test_default(), db);
        state.entitlements.seed_default_plans().await.unwrap();
        state
    }

    async fn seed_user(state: &AppState, name: &str) -> String {
        let mut user = User::new(uuid::Uuid::new_v4().to_string(), name);
        user.is_verified = true;
        state.db.upsert_user(&user).await.unwrap();
        user.id
    }

    async fn make_mutual(state: &AppState, a: &str, b: &str) {
        for (from, to) in [(a, b), (b, a)] {
            state
                .db
                .insert_edge(EdgeKind::Like, &Edge::new(from, to))
                .await
                .unwrap();
        }
    }

    fn drain(rx: &mut mpsc::Receiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn error_code(events: &[ServerEvent]) -> Option<&str> {
        match events {
            [ServerEvent::Error { code, .. }] => Some(code.as_str()),
            _ => None,
        }
    }

    #[test]
    fn test_client_event_parsing() {
        let event = ClientEvent::parse(
            r#"{"event":"send-message","data":{"receiver_id":"b","text":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                receiver_id: "b".to_string(),
                text: "hi".to_string()
            }
        );

        let join = ClientEvent::parse(r#"{"event":"join-user","data":{}}"#).unwrap();
        assert_eq!(join, ClientEvent::JoinUser { user_id: None });

        assert!(ClientEvent::parse(r#"{"event":"dance","data":{}}"#).is_err());
        assert!(ClientEvent::parse("not json").is_err());
    }

    #[test]
    fn test_join_without_data() {
        let join = ClientEvent::parse(r#"{"event":"join-user"}"#).unwrap();
        assert_eq!(join, ClientEvent::JoinUser { user_id: None });

        // Required fields are still required
        assert!(ClientEvent::parse(r#"{"event":"send-message"}"#).is_err());
    }

    #[tokio::test]
    async fn test_events_before_join_are_refused() {
        let state = test_state().await;
        let a = seed_user(&state, "Ana").await;
        let b = seed_user(&state, "Ben").await;
        make_mutual(&state, &a, &b).await;

        let (handle, mut rx) = ConnectionHandle::new();
        let mut session = Session {
            state: &state,
            user_id: &a,
            handle: &handle,
            joined: false,
        };

        session
            .handle_text(&format!(
                r#"{{"event":"send-message","data":{{"receiver_id":"{}","text":"hi"}}}}"#,
                b
            ))
            .await;

        assert_eq!(error_code(&drain(&mut rx)), Some("bad_request"));
        assert!(!state.connections.is_online(&a));
        let conversation = state
            .db
            .get_conversation(&Conversation::id_for(&a, &b))
            .await
            .unwrap();
        assert!(conversation.is_none());
    }

    #[tokio::test]
    async fn test_join_with_other_identity_is_unauthorized() {
        let state = test_state().await;
        let a = seed_user(&state, "Ana").await;
        let b = seed_user(&state, "Ben").await;

        let (handle, mut rx) = ConnectionHandle::new();
        let mut session = Session {
            state: &state,
            user_id: &a,
            handle: &handle,
            joined: false,
        };

        session
            .handle_text(&format!(
                r#"{{"event":"join-user","data":{{"user_id":"{}"}}}}"#,
                b
            ))
            .await;

        assert_eq!(error_code(&drain(&mut rx)), Some("unauthorized"));
        assert!(!session.joined);
        assert!(!state.connections.is_online(&a));
        assert!(!state.connections.is_online(&b));
    }

    #[tokio::test]
    async fn test_join_registers_and_delivers_pending() {
        let state = test_state().await;
        let a = seed_user(&state, "Ana").await;
        let b = seed_user(&state, "Ben").await;
        make_mutual(&state, &a, &b).await;
        state.chat.send_message(&a, &b, "while away").await.unwrap();

        let (handle, mut rx) = ConnectionHandle::new();
        let mut session = Session {
            state: &state,
            user_id: &b,
            handle: &handle,
            joined: false,
        };
        session
            .handle_text(&format!(
                r#"{{"event":"join-user","data":{{"user_id":"{}"}}}}"#,
                b
            ))
            .await;

        assert!(session.joined);
        let registered = state.connections.lookup(&b).unwrap();
        assert_eq!(registered.id(), handle.id());

        assert_eq!(
            drain(&mut rx),
            vec![ServerEvent::UnreadCount {
                conversation_id: Conversation::id_for(&a, &b),
                counterpart_id: a.clone(),
                count: 1,
            }]
        );
        let conversation = state
            .db
            .get_conversation(&Conversation::id_for(&a, &b))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conversation.messages[0].state(), DeliveryState::Delivered);
    }

    #[tokio::test]
    async fn test_errors_reach_only_the_failing_socket() {
        let state = test_state().await;
        let a = seed_user(&state, "Ana").await;
        let b = seed_user(&state, "Ben").await;
        let c = seed_user(&state, "Cy").await;
        make_mutual(&state, &a, &b).await;

        let (handle_a, mut rx_a) = ConnectionHandle::new();
        let (handle_b, mut rx_b) = ConnectionHandle::new();
        let mut session_a = Session {
            state: &state,
            user_id: &a,
            handle: &handle_a,
            joined: false,
        };
        let mut session_b = Session {
            state: &state,
            user_id: &b,
            handle: &handle_b,
            joined: false,
        };
        session_a.handle_text(r#"{"event":"join-user"}"#).await;
        session_b.handle_text(r#"{"event":"join-user"}"#).await;

        // No mutual like with c
        session_a
            .handle_text(&format!(
                r#"{{"event":"send-message","data":{{"receiver_id":"{}","text":"hi"}}}}"#,
                c
            ))
            .await;
        assert_eq!(error_code(&drain(&mut rx_a)), Some("mutual_like_required"));
        assert!(drain(&mut rx_b).is_empty());

        session_a.handle_text("{").await;
        assert_eq!(error_code(&drain(&mut rx_a)), Some("bad_request"));
        assert!(drain(&mut rx_b).is_empty());

        // The session stays usable after an error
        session_a
            .handle_text(&format!(
                r#"{{"event":"send-message","data":{{"receiver_id":"{}","text":"hi"}}}}"#,
                b
            ))
            .await;
        assert!(matches!(
            &drain(&mut rx_b)[..],
            [ServerEvent::ReceiveMessage(payload)] if payload.text == "hi"
        ));
    }

    #[tokio::test]
    async fn test_close_unregisters_only_its_own_connection() {
        let state = test_state().await;
        let a = seed_user(&state, "Ana").await;

        let (old_handle, _old_rx) = ConnectionHandle::new();
        let mut old = Session {
            state: &state,
            user_id: &a,
            handle: &old_handle,
            joined: false,
        };
        old.handle_text(r#"{"event":"join-user"}"#).await;

        let (new_handle, _new_rx) = ConnectionHandle::new();
        let mut new = Session {
            state: &state,
            user_id: &a,
            handle: &new_handle,
            joined: false,
        };
        new.handle_text(r#"{"event":"join-user"}"#).await;

        // The replaced socket closing late must not evict the live one
        old.close();
        assert_eq!(state.connections.lookup(&a).unwrap().id(), new_handle.id());

        new.close();
        assert!(!state.connections.is_online(&a));
    }
}
