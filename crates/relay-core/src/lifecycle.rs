use crate::ports::{DriverEvent, SessionIdentity};
use crate::session::{LifecycleEvent, TransitionResult};
use crate::Gateway;
use protocol::{ServerEvent, SessionInfo, SessionStatus, StatusPayload};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Bookkeeping for the single deferred recovery task.
///
/// Every recovery (or operator reset) runs under a ticket. Any preempting event bumps
/// the epoch, which turns the current ticket stale; a stale holder no longer blocks a
/// new recovery from being scheduled.
#[derive(Debug, Default)]
pub(crate) struct RecoveryGate {
    slot: Mutex<RecoverySlot>,
}

#[derive(Debug, Default)]
struct RecoverySlot {
    epoch: u64,
    /// Ticket of the task holding the slot, if any.
    holder: Option<u64>,
}

impl RecoveryGate {
    fn slot(&self) -> MutexGuard<'_, RecoverySlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn preempt(&self) {
        self.slot().epoch += 1;
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.slot().epoch == ticket
    }

    /// Issues a ticket unless a live (not preempted) holder already owns the slot.
    fn try_claim(&self) -> Option<u64> {
        let mut slot = self.slot();
        if slot.holder == Some(slot.epoch) {
            return None;
        }
        Some(Self::issue(&mut slot))
    }

    /// Preempts whoever holds the slot and takes it.
    fn claim(&self) -> u64 {
        Self::issue(&mut self.slot())
    }

    fn issue(slot: &mut RecoverySlot) -> u64 {
        slot.epoch += 1;
        slot.holder = Some(slot.epoch);
        slot.epoch
    }

    fn release(&self, ticket: u64) {
        let mut slot = self.slot();
        if slot.holder == Some(ticket) {
            slot.holder = None;
        }
    }
}

impl Gateway {
    /// Initializes the driver once at startup. A failure parks the session in
    /// `auth_failure` until an operator reset.
    pub async fn start(&self) {
        info!("Initializing session driver...");
        if let Err(e) = self.driver.initialize().await {
            error!("Failed to initialize session driver: {:#}", e);
            self.fail_session(LifecycleEvent::InitFailed, format!("Browser Launch Failed: {}", e))
                .await;
        }
    }

    /// Consumes the driver event bus until it closes.
    ///
    /// Lifecycle events are applied in arrival order. Message and call events are
    /// handled on their own tasks so a slow contact lookup never stalls the lifecycle.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<DriverEvent>) {
        while let Some(event) = events.recv().await {
            debug!(kind = event.kind(), "driver event");
            if matches!(event, DriverEvent::Message(_) | DriverEvent::Call(_)) {
                let this = Arc::clone(&self);
                tokio::spawn(async move { this.handle_event(event).await });
            } else {
                self.handle_event(event).await;
            }
        }
        warn!("Driver event bus closed");
    }

    /// Applies one driver event to completion.
    pub async fn handle_event(self: &Arc<Self>, event: DriverEvent) {
        match event {
            DriverEvent::Qr(payload) => self.on_login_challenge(&payload).await,
            DriverEvent::Authenticated => self.on_authenticated().await,
            DriverEvent::Ready(identity) => self.on_ready(identity).await,
            DriverEvent::AuthFailure(message) => {
                error!("AUTHENTICATION FAILURE: {}", message);
                self.fail_session(LifecycleEvent::AuthFailure, message).await;
            }
            DriverEvent::Disconnected(reason) => self.on_disconnected(&reason).await,
            DriverEvent::Message(message) => self.relay_message(message).await,
            DriverEvent::Call(call) => self.handle_call(call).await,
        }
    }

    async fn on_login_challenge(&self, payload: &str) {
        info!("Login challenge received");
        let image = match self.renderer.render(payload) {
            Ok(image) => image,
            Err(e) => {
                error!("Error generating QR code: {:#}", e);
                return;
            }
        };

        {
            let mut state = self.state.write().await;
            if !self.accept(state.apply(LifecycleEvent::LoginChallenge)) {
                return;
            }
            state.challenge = Some(image.clone());
            self.advance_generation();
        }
        self.recovery.preempt();

        self.hub.publish(ServerEvent::Qr(image));
        self.hub.publish(ServerEvent::Status(StatusPayload::bare(SessionStatus::QrReady)));
    }

    async fn on_authenticated(&self) {
        {
            let mut state = self.state.write().await;
            if !self.accept(state.apply(LifecycleEvent::Authenticated)) {
                return;
            }
            self.advance_generation();
        }
        self.recovery.preempt();
        info!("Authenticated");
        self.hub.publish(ServerEvent::Status(StatusPayload::bare(SessionStatus::Authenticated)));
    }

    async fn on_ready(self: &Arc<Self>, identity: SessionIdentity) {
        let (payload, generation) = {
            let mut state = self.state.write().await;
            if !self.accept(state.apply(LifecycleEvent::Ready)) {
                return;
            }
            state.info = Some(SessionInfo {
                wid: identity.wid.clone(),
                pushname: identity.pushname,
                platform: identity.platform,
                profile_pic_url: String::new(),
            });
            (state.status_payload(), self.advance_generation())
        };
        self.recovery.preempt();
        info!("Session is ready as {}", identity.wid);

        self.hub.publish(ServerEvent::Status(payload));
        self.spawn_profile_picture(generation, identity.wid);
        self.spawn_contacts_refresh();
    }

    /// Fetches the account picture off the event path and patches it into the info
    /// record if the session is still the one that asked for it.
    fn spawn_profile_picture(self: &Arc<Self>, generation: u64, wid: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let url = match this.driver.get_profile_pic_url(&wid).await {
                Ok(url) if !url.is_empty() => url,
                Ok(_) => return,
                Err(e) => {
                    warn!("Error getting profile pic: {:#}", e);
                    return;
                }
            };
            let payload = {
                let mut state = this.state.write().await;
                if this.generation() != generation || state.status() != SessionStatus::Connected {
                    debug!("Discarding profile picture for a superseded session");
                    return;
                }
                match state.info.as_mut() {
                    Some(info) => info.profile_pic_url = url,
                    None => return,
                }
                state.status_payload()
            };
            this.hub.publish(ServerEvent::Status(payload));
        });
    }

    /// `any -> auth_failure`, carrying a human-readable reason to observers.
    async fn fail_session(&self, event: LifecycleEvent, message: String) {
        let status = {
            let mut state = self.state.write().await;
            if !self.accept(state.apply(event)) {
                return;
            }
            self.advance_generation();
            state.status()
        };
        // parked until an operator reset; a pending re-initialization must not revive it
        self.recovery.preempt();
        self.hub.publish(ServerEvent::Status(StatusPayload {
            status,
            info: None,
            message: Some(message),
        }));
    }

    async fn on_disconnected(self: &Arc<Self>, reason: &str) {
        info!("Client was logged out: {}", reason);
        self.clear_session(LifecycleEvent::Disconnected).await;
        self.schedule_recovery();
    }

    /// `any -> disconnected`: drops info, challenge and contacts, then tells observers.
    pub(crate) async fn clear_session(&self, event: LifecycleEvent) {
        {
            let mut state = self.state.write().await;
            self.accept(state.apply(event));
            self.advance_generation();
        }
        self.hub.publish(ServerEvent::Status(StatusPayload::bare(SessionStatus::Disconnected)));
    }

    /// Schedules logout, a fixed delay, then one re-initialization attempt.
    ///
    /// The delay keeps the re-initialization from racing the logout for the on-disk
    /// session storage. A login challenge, authentication, ready, failure or reset
    /// arriving during the delay cancels the re-initialization; a later disconnect then
    /// schedules a fresh recovery.
    fn schedule_recovery(self: &Arc<Self>) {
        let Some(ticket) = self.recovery.try_claim() else {
            info!("Recovery already in progress; not scheduling another");
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.recover(ticket).await;
            this.recovery.release(ticket);
        });
    }

    async fn recover(&self, ticket: u64) {
        if let Err(e) = self.driver.logout().await {
            debug!("Logout before reinitialize failed (ignored): {:#}", e);
        }
        tokio::time::sleep(self.options.recovery_delay).await;
        if !self.recovery.is_current(ticket) {
            info!("Recovery preempted by a newer session event");
            return;
        }
        info!("Reinitializing session driver");
        if let Err(e) = self.driver.initialize().await {
            error!("Error during client reinitialize: {:#}", e);
        }
    }

    /// Cancels a pending recovery and claims the slot for an operator reset.
    pub(crate) fn preempt_recovery(&self) -> u64 {
        self.recovery.claim()
    }

    pub(crate) fn release_recovery(&self, ticket: u64) {
        self.recovery.release(ticket);
    }

    fn accept(&self, result: TransitionResult) -> bool {
        match result {
            TransitionResult::Success { old_state, new_state } => {
                debug!("Session status {} -> {}", old_state, new_state);
                true
            }
            TransitionResult::InvalidTransition { current_state, event } => {
                warn!("Ignoring {} while {}", event, current_state);
                false
            }
        }
    }
}
