pub mod driver;
pub mod guard;

pub use driver::{
    ChatSummary, DriverEvent, InboundCall, InboundMessage, LastMessage, PresenceState,
    SessionIdentity,
};
pub use guard::TransientErrorGuard;

use anyhow::Result;
use async_trait::async_trait;
use protocol::WebhookPayload;

/// Command surface of the external session driver.
///
/// The driver serializes calls against its automation session itself; callers do not
/// hold any lock across these awaits. Lifecycle progress is not returned from these
/// calls but published as [`DriverEvent`]s on the event bus.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    /// Starts bringing the session up. Returns once startup has been kicked off.
    async fn initialize(&self) -> Result<()>;
    /// Logs the session out and releases its on-disk storage.
    async fn logout(&self) -> Result<()>;
    /// Sends a text message; returns the driver's acknowledgement as-is.
    async fn send_message(&self, chat_id: &str, body: &str) -> Result<serde_json::Value>;
    /// Resolves a bare number to a canonical chat id, `None` when not a registered user.
    async fn get_number_id(&self, number: &str) -> Result<Option<String>>;
    async fn get_chats(&self) -> Result<Vec<ChatSummary>>;
    async fn get_profile_pic_url(&self, id: &str) -> Result<String>;
    /// Registered number of the contact behind a sender id, if known.
    async fn get_contact_number(&self, id: &str) -> Result<Option<String>>;
    async fn mark_read(&self, chat_id: &str) -> Result<()>;
    async fn set_chat_state(&self, chat_id: &str, state: PresenceState) -> Result<()>;
    async fn reject_call(&self, call_id: &str) -> Result<()>;
}

/// Outbound webhook target. Implementations report non-2xx answers as errors.
#[async_trait]
pub trait WebhookPort: Send + Sync {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<()>;
}

/// Turns a raw login-challenge payload into a displayable image URI.
pub trait ChallengeRenderer: Send + Sync {
    fn render(&self, payload: &str) -> Result<String>;
}
