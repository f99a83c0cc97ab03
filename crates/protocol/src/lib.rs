use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical connection status of the one supported session.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Disconnected,
    QrReady,
    Authenticated,
    Connected,
    AuthFailure,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::QrReady => "qr_ready",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Connected => "connected",
            SessionStatus::AuthFailure => "auth_failure",
        }
    }

    /// Outbound sends are accepted once the session is authenticated.
    pub fn can_send(&self) -> bool {
        matches!(self, SessionStatus::Connected | SessionStatus::Authenticated)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the logged-in account. Only the fields safe to hand to observers.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub wid: String,
    pub pushname: String,
    pub platform: String,
    #[serde(rename = "profilePicUrl")]
    pub profile_pic_url: String,
}

/// One row of the "recent conversations" projection.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactEntry {
    pub id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    #[serde(rename = "phone")]
    pub phone_digits: String,
    #[serde(rename = "isGroup")]
    pub is_group: bool,
    #[serde(rename = "unreadCount")]
    pub unread_count: u32,
    #[serde(rename = "lastMessage")]
    pub last_message_body: String,
    #[serde(rename = "lastMessageAt")]
    pub last_message_timestamp: Option<i64>,
}

/// Behavior toggles applied to inbound events.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(rename = "rejectCall")]
    pub reject_incoming_calls: bool,
    #[serde(rename = "markRead")]
    pub auto_mark_read: bool,
}

/// Body POSTed to the configured webhook for every relayed inbound message.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub phone: String,
    pub from: String,
    pub from_jid: String,
    pub body: String,
    pub name: String,
    pub timestamp: i64,
}

/// Status frame pushed to observers.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<SessionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusPayload {
    pub fn bare(status: SessionStatus) -> Self {
        Self { status, info: None, message: None }
    }
}

/// Server -> observer frames on the push channel.
/// Encoded as `{"event": <name>, "data": <payload>}`.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Status(StatusPayload),
    /// Login challenge rendered as a displayable image URI.
    Qr(String),
    Contacts(Vec<ContactEntry>),
}

/// Observer -> server frames on the push channel.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientEvent {
    GetContacts,
}

/// Body of `GET /status`.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: SessionStatus,
    pub info: Option<SessionInfo>,
    pub qr: Option<String>,
}
