use crate::ports::{InboundCall, InboundMessage};
use crate::Gateway;
use protocol::{SessionStatus, WebhookPayload};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub fn digits_only(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Digits of the local part of a raw sender id (`15550001@c.us` -> `15550001`).
pub fn sender_digits(from: &str) -> String {
    let local = from.split('@').next().unwrap_or(from);
    digits_only(local)
}

impl Gateway {
    /// Forwards one inbound message to the webhook and applies the behavior toggles.
    pub async fn relay_message(self: &Arc<Self>, message: InboundMessage) {
        if message.is_status {
            debug!("Dropping status broadcast {}", message.id);
            return;
        }
        info!("Message received from {}", message.from);

        let phone = self.resolve_sender_phone(&message.from).await;
        let payload = WebhookPayload {
            phone: phone.clone(),
            from: phone,
            from_jid: message.from.clone(),
            body: message.body,
            name: message.notify_name.unwrap_or_default(),
            timestamp: message.timestamp,
        };
        self.spawn_webhook_delivery(payload);

        if self.behavior_config().await.auto_mark_read {
            if let Err(e) = self.driver.mark_read(&message.from).await {
                warn!("Error marking read: {:#}", e);
            }
        }

        if self.current_status().await == SessionStatus::Connected {
            self.spawn_contacts_refresh();
        }
    }

    /// Prefers the contact's registered number, falls back to the sender id digits.
    async fn resolve_sender_phone(&self, from: &str) -> String {
        match self.driver.get_contact_number(from).await {
            Ok(Some(number)) if !number.is_empty() => digits_only(&number),
            Ok(_) => sender_digits(from),
            Err(e) => {
                warn!("Error getting contact info for incoming message: {:#}", e);
                sender_digits(from)
            }
        }
    }

    fn spawn_webhook_delivery(&self, payload: WebhookPayload) {
        let webhook = Arc::clone(&self.webhook);
        tokio::spawn(async move {
            match webhook.deliver(&payload).await {
                Ok(()) => info!("Message from {} forwarded to webhook", payload.from_jid),
                Err(e) => error!("Error forwarding message to webhook: {:#}", e),
            }
        });
    }

    /// Calls are never relayed; they are only rejected when configured to.
    pub async fn handle_call(&self, call: InboundCall) {
        if !self.behavior_config().await.reject_incoming_calls {
            debug!("Incoming call from {} left ringing", call.from);
            return;
        }
        match self.driver.reject_call(&call.id).await {
            Ok(()) => info!("Incoming call from {} rejected automatically", call.from),
            Err(e) => warn!("Error rejecting call: {:#}", e),
        }
    }
}
