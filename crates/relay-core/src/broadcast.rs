use crate::Gateway;
use protocol::{ContactEntry, ServerEvent, SessionStatus};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out of push frames to every connected observer.
#[derive(Debug, Clone)]
pub struct SubscriberHub {
    tx: broadcast::Sender<ServerEvent>,
}

impl SubscriberHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ServerEvent) {
        // no observers connected is not an error
        if self.tx.send(event).is_err() {
            debug!("No observers connected; push frame dropped");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// A freshly attached observer: the replay to send first, then the live feed.
pub struct Subscription {
    pub replay: Vec<ServerEvent>,
    pub live: broadcast::Receiver<ServerEvent>,
}

impl Gateway {
    /// Frames a new observer receives immediately on connect.
    pub async fn snapshot_events(&self) -> Vec<ServerEvent> {
        let state = self.state.read().await;
        let mut events = vec![ServerEvent::Status(state.status_payload())];
        if state.status() == SessionStatus::QrReady {
            if let Some(challenge) = &state.challenge {
                events.push(ServerEvent::Qr(challenge.clone()));
            }
        }
        if !state.contacts.is_empty() {
            events.push(ServerEvent::Contacts(state.contacts.clone()));
        }
        events
    }

    /// Attaches an observer. The live receiver is taken before the replay snapshot so
    /// no frame published in between is lost (it may be seen twice).
    pub async fn subscribe(&self) -> Subscription {
        let live = self.hub.subscribe();
        let replay = self.snapshot_events().await;
        Subscription { replay, live }
    }

    /// Handles an observer's `get_contacts` request.
    ///
    /// Returns the cached contacts to resend to the requester, or `None` after
    /// kicking off a refresh whose result is broadcast to everyone.
    pub async fn request_contacts(self: &Arc<Self>) -> Option<Vec<ContactEntry>> {
        let (contacts, status) = {
            let state = self.state.read().await;
            (state.contacts.clone(), state.status())
        };
        if !contacts.is_empty() {
            return Some(contacts);
        }
        if status == SessionStatus::Connected {
            self.spawn_contacts_refresh();
        }
        None
    }
}
