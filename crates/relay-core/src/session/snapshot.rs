use super::state::{LifecycleEvent, SessionStateMachine, TransitionResult};
use protocol::{ContactEntry, SessionInfo, SessionStatus, StatusPayload, StatusResponse};

/// Every piece of session-derived state, owned as one aggregate.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    machine: SessionStateMachine,
    pub info: Option<SessionInfo>,
    /// Rendered login challenge; only meaningful while `qr_ready`.
    pub challenge: Option<String>,
    pub contacts: Vec<ContactEntry>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> SessionStatus {
        self.machine.current_state()
    }

    /// Applies `event` and the data side effects every edge carries.
    pub fn apply(&mut self, event: LifecycleEvent) -> TransitionResult {
        let result = self.machine.apply(event);
        if let TransitionResult::Success { new_state, .. } = result {
            match new_state {
                SessionStatus::Disconnected => self.clear(),
                SessionStatus::Authenticated | SessionStatus::Connected => self.challenge = None,
                SessionStatus::QrReady | SessionStatus::AuthFailure => {}
            }
        }
        result
    }

    fn clear(&mut self) {
        self.info = None;
        self.challenge = None;
        self.contacts.clear();
    }

    pub fn status_payload(&self) -> StatusPayload {
        StatusPayload {
            status: self.status(),
            info: self.info.clone(),
            message: None,
        }
    }

    pub fn status_response(&self) -> StatusResponse {
        StatusResponse {
            status: self.status(),
            info: self.info.clone(),
            qr: self.challenge.clone(),
        }
    }
}
