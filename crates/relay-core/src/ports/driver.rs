use serde::{Deserialize, Serialize};
use std::fmt;

/// Typed events published by the session driver onto the event bus.
///
/// Wire form (sidecar): `{"event": "ready", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum DriverEvent {
    /// Raw login-challenge payload, not yet rendered.
    Qr(String),
    Authenticated,
    Ready(SessionIdentity),
    AuthFailure(String),
    Disconnected(String),
    Message(InboundMessage),
    Call(InboundCall),
}

impl DriverEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DriverEvent::Qr(_) => "qr",
            DriverEvent::Authenticated => "authenticated",
            DriverEvent::Ready(_) => "ready",
            DriverEvent::AuthFailure(_) => "auth_failure",
            DriverEvent::Disconnected(_) => "disconnected",
            DriverEvent::Message(_) => "message",
            DriverEvent::Call(_) => "call",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    /// Serialized account id, e.g. `15550001@c.us`.
    pub wid: String,
    #[serde(default)]
    pub pushname: String,
    #[serde(default)]
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    /// Raw sender id, e.g. `15550001@c.us`.
    pub from: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub notify_name: Option<String>,
    /// Epoch seconds; 0 when the driver does not report one.
    #[serde(default)]
    pub timestamp: i64,
    /// Ephemeral status broadcasts; never relayed.
    #[serde(default)]
    pub is_status: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundCall {
    pub id: String,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

/// Conversation as listed by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    /// Serialized chat id.
    pub id: String,
    /// Bare numeric part of the chat id.
    pub user: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub contact_pushname: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<LastMessage>,
}

/// Transient indicator shown to the remote party of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceState {
    Typing,
    Recording,
    Clear,
}

impl PresenceState {
    /// Unknown names map to `None`; callers treat that as "no action".
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "typing" => Some(PresenceState::Typing),
            "recording" => Some(PresenceState::Recording),
            "clear" => Some(PresenceState::Clear),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceState::Typing => "typing",
            PresenceState::Recording => "recording",
            PresenceState::Clear => "clear",
        }
    }
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
