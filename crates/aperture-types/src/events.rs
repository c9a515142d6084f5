use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Commands sent FROM client TO server over the chat gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Subscribe this connection to a conversation's room.
    #[serde(rename = "chat:join")]
    Join(JoinPayload),

    /// Persist and broadcast a message. Always answered with a `chat:ack`.
    #[serde(rename = "chat:send")]
    Send(SendPayload),
}

/// Target of a join request. Fields stay optional so malformed frames get
/// the platform's own handling (silently ignored) instead of a
/// deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub chat_type: Option<String>,
    pub target_id: Option<i64>,
}

/// Body of a send request, validated field by field in the room router.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPayload {
    pub chat_type: Option<String>,
    pub target_id: Option<i64>,
    pub content: Option<String>,
}

/// Events pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Sent once, immediately after a successful upgrade.
    #[serde(rename = "ready", rename_all = "camelCase")]
    Ready { user_id: i64 },

    /// A message was posted to a room this connection subscribes to.
    #[serde(rename = "chat:message")]
    Message(ChatMessage),

    /// Outcome of this connection's own `chat:send`.
    #[serde(rename = "chat:ack")]
    Ack(SendAck),
}

impl ServerEvent {
    /// Wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Ready { .. } => "ready",
            ServerEvent::Message(_) => "chat:message",
            ServerEvent::Ack(_) => "chat:ack",
        }
    }
}

/// Acknowledgement for `chat:send`. Exactly one of `message` (the
/// persisted, sender-enriched payload) or `message_text` (a human-readable
/// failure reason) is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_text: Option<String>,
}

impl SendAck {
    pub fn success(message: ChatMessage) -> Self {
        Self {
            ok: true,
            message: Some(message),
            message_text: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: None,
            message_text: Some(reason.into()),
        }
    }
}
