pub mod snapshot;
pub mod state;

pub use snapshot::SessionState;
pub use state::{LifecycleEvent, SessionStateMachine, TransitionResult};
