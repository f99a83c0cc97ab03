use protocol::SessionStatus;
use std::fmt;

/// Inputs to the lifecycle transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    LoginChallenge,
    Authenticated,
    Ready,
    AuthFailure,
    /// Driver initialization itself failed.
    InitFailed,
    Disconnected,
    /// Operator-issued reset.
    Reset,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::LoginChallenge => "login_challenge",
            LifecycleEvent::Authenticated => "authenticated",
            LifecycleEvent::Ready => "ready",
            LifecycleEvent::AuthFailure => "auth_failure",
            LifecycleEvent::InitFailed => "init_failed",
            LifecycleEvent::Disconnected => "disconnected",
            LifecycleEvent::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// Result of a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Success { old_state: SessionStatus, new_state: SessionStatus },
    InvalidTransition { current_state: SessionStatus, event: LifecycleEvent },
}

impl TransitionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, TransitionResult::Success { .. })
    }
}

/// Owns the canonical connection status.
#[derive(Debug, Clone)]
pub struct SessionStateMachine {
    current_state: SessionStatus,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: SessionStatus::Disconnected,
        }
    }

    pub fn current_state(&self) -> SessionStatus {
        self.current_state
    }

    /// Target status for `event` from `from`, `None` when the table has no edge.
    pub fn next_state(from: SessionStatus, event: LifecycleEvent) -> Option<SessionStatus> {
        use LifecycleEvent as E;
        use SessionStatus as S;
        match (from, event) {
            // a new challenge supersedes the previous one
            (S::Disconnected | S::QrReady, E::LoginChallenge) => Some(S::QrReady),
            (S::Disconnected | S::QrReady, E::Authenticated) => Some(S::Authenticated),
            (S::Authenticated, E::Ready) => Some(S::Connected),
            (_, E::AuthFailure | E::InitFailed) => Some(S::AuthFailure),
            (_, E::Disconnected | E::Reset) => Some(S::Disconnected),
            _ => None,
        }
    }

    pub fn can_transition(&self, event: LifecycleEvent) -> bool {
        Self::next_state(self.current_state, event).is_some()
    }

    pub fn apply(&mut self, event: LifecycleEvent) -> TransitionResult {
        match Self::next_state(self.current_state, event) {
            Some(new_state) => {
                let old_state = self.current_state;
                self.current_state = new_state;
                TransitionResult::Success { old_state, new_state }
            }
            None => TransitionResult::InvalidTransition {
                current_state: self.current_state,
                event,
            },
        }
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleEvent as E;
    use SessionStatus as S;

    #[test]
    fn happy_path_to_connected() {
        let mut sm = SessionStateMachine::new();
        assert_eq!(sm.current_state(), S::Disconnected);

        assert!(sm.apply(E::LoginChallenge).is_success());
        assert_eq!(sm.current_state(), S::QrReady);
        assert!(sm.apply(E::LoginChallenge).is_success());
        assert_eq!(sm.current_state(), S::QrReady);
        assert!(sm.apply(E::Authenticated).is_success());
        assert_eq!(sm.current_state(), S::Authenticated);
        assert_eq!(
            sm.apply(E::Ready),
            TransitionResult::Success { old_state: S::Authenticated, new_state: S::Connected }
        );
    }

    #[test]
    fn restored_session_skips_challenge() {
        let mut sm = SessionStateMachine::new();
        assert!(sm.apply(E::Authenticated).is_success());
        assert!(sm.apply(E::Ready).is_success());
        assert_eq!(sm.current_state(), S::Connected);
    }

    #[test]
    fn ready_without_authentication_is_rejected() {
        let mut sm = SessionStateMachine::new();
        sm.apply(E::LoginChallenge);
        let result = sm.apply(E::Ready);
        assert_eq!(
            result,
            TransitionResult::InvalidTransition { current_state: S::QrReady, event: E::Ready }
        );
        assert_eq!(sm.current_state(), S::QrReady);
    }

    #[test]
    fn failure_and_disconnect_reach_from_anywhere() {
        for start in [S::Disconnected, S::QrReady, S::Authenticated, S::Connected, S::AuthFailure] {
            assert_eq!(SessionStateMachine::next_state(start, E::AuthFailure), Some(S::AuthFailure));
            assert_eq!(SessionStateMachine::next_state(start, E::InitFailed), Some(S::AuthFailure));
            assert_eq!(SessionStateMachine::next_state(start, E::Disconnected), Some(S::Disconnected));
            assert_eq!(SessionStateMachine::next_state(start, E::Reset), Some(S::Disconnected));
        }
    }

    #[test]
    fn auth_failure_holds_until_reset() {
        let mut sm = SessionStateMachine::new();
        sm.apply(E::InitFailed);
        assert!(!sm.can_transition(E::LoginChallenge));
        assert!(!sm.can_transition(E::Authenticated));
        assert!(sm.apply(E::Reset).is_success());
        assert!(sm.apply(E::LoginChallenge).is_success());
    }

    #[test]
    fn sequence_matches_table_fold() {
        let events = [
            E::Ready, E::LoginChallenge, E::Authenticated, E::LoginChallenge, E::Ready,
            E::Disconnected, E::Authenticated, E::Ready, E::AuthFailure, E::Ready, E::Reset,
        ];
        let mut sm = SessionStateMachine::new();
        let mut expected = S::Disconnected;
        for ev in events {
            sm.apply(ev);
            expected = SessionStateMachine::next_state(expected, ev).unwrap_or(expected);
            assert_eq!(sm.current_state(), expected, "after {}", ev);
        }
        assert_eq!(sm.current_state(), S::Disconnected);
    }
}
