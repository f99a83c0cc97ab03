use crate::ports::PresenceState;
use crate::session::LifecycleEvent;
use crate::Gateway;
use protocol::{BehaviorConfig, SessionStatus, StatusResponse};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum CommandError {
    /// Malformed or missing input, or a number that is not a registered user.
    #[error("{0}")]
    BadRequest(String),
    /// The session is not usable for the requested action.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// The driver rejected the call.
    #[error(transparent)]
    Driver(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatStateRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Partial config update. A key that is present (even as `null`) is applied by
/// truthiness; an absent key leaves the field untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigPatch {
    #[serde(default, rename = "rejectCall", deserialize_with = "present")]
    pub reject_call: Option<Value>,
    #[serde(default, rename = "markRead", deserialize_with = "present")]
    pub mark_read: Option<Value>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// `false`, `null`, `0`, `NaN` and `""` are falsy; everything else is truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}

impl Gateway {
    /// Sends a text message to `chat_id` (preferred) or `phone`.
    pub async fn send_message(&self, request: SendMessageRequest) -> Result<Value, CommandError> {
        let target = non_empty(request.chat_id).or_else(|| non_empty(request.phone));
        let (Some(target), Some(message)) = (target, non_empty(request.message)) else {
            return Err(CommandError::BadRequest(
                "Phone or chat_id and message are required".to_string(),
            ));
        };
        if !self.current_status().await.can_send() {
            return Err(CommandError::ServiceUnavailable(
                "WhatsApp client is not connected".to_string(),
            ));
        }

        let chat_id = self
            .resolve_chat_id(&target, "The number is not a valid WhatsApp user")
            .await?;
        self.driver.send_message(&chat_id, &message).await.map_err(|e| {
            error!("Error sending message to {}: {:#}", chat_id, e);
            CommandError::Driver(e)
        })
    }

    /// Canonical status snapshot; always available.
    pub async fn status(&self) -> StatusResponse {
        self.state.read().await.status_response()
    }

    /// Operator reset: clear everything to `disconnected`, log out, re-initialize.
    ///
    /// The cleared state is visible before the driver is touched, so it holds even
    /// when logout or initialize then fails.
    pub async fn reset(&self) -> Result<(), CommandError> {
        let ticket = self.preempt_recovery();
        info!("Resetting session");
        self.clear_session(LifecycleEvent::Reset).await;

        let result = self.reinitialize().await;
        self.release_recovery(ticket);
        result.map_err(|e| {
            error!("Error resetting session: {:#}", e);
            CommandError::Driver(e)
        })
    }

    async fn reinitialize(&self) -> anyhow::Result<()> {
        self.driver.logout().await?;
        self.driver.initialize().await
    }

    /// Merges the provided fields and returns the resulting config.
    pub async fn update_config(&self, patch: ConfigPatch) -> BehaviorConfig {
        let mut config = self.config.write().await;
        if let Some(value) = &patch.reject_call {
            config.reject_incoming_calls = truthy(value);
        }
        if let Some(value) = &patch.mark_read {
            config.auto_mark_read = truthy(value);
        }
        info!(
            reject_call = config.reject_incoming_calls,
            mark_read = config.auto_mark_read,
            "Behavior config updated"
        );
        *config
    }

    /// Shows a presence indicator in the conversation with `phone`.
    ///
    /// Unknown state names are accepted without touching the driver.
    pub async fn set_chat_state(&self, request: ChatStateRequest) -> Result<(), CommandError> {
        let (Some(phone), Some(state)) = (non_empty(request.phone), non_empty(request.state)) else {
            return Err(CommandError::BadRequest("Phone and state are required".to_string()));
        };
        if self.current_status().await != SessionStatus::Connected {
            return Err(CommandError::ServiceUnavailable("WhatsApp not connected".to_string()));
        }

        let chat_id = self.resolve_chat_id(&phone, "Invalid number").await?;
        match PresenceState::parse(&state) {
            Some(presence) => self.driver.set_chat_state(&chat_id, presence).await?,
            None => debug!("Ignoring unknown chat state {:?} for {}", state, chat_id),
        }
        Ok(())
    }

    /// Identifiers without a domain qualifier are looked up as numbers.
    async fn resolve_chat_id(&self, target: &str, invalid: &str) -> Result<String, CommandError> {
        if target.contains('@') {
            return Ok(target.to_string());
        }
        match self.driver.get_number_id(target).await? {
            Some(id) => Ok(id),
            None => Err(CommandError::BadRequest(invalid.to_string())),
        }
    }
}
