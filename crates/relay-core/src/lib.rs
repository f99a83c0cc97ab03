pub mod broadcast;
pub mod commands;
pub mod contacts;
pub mod lifecycle;
pub mod mocks;
pub mod ports;
pub mod relay;
pub mod session;

pub use broadcast::{SubscriberHub, Subscription};
pub use commands::{ChatStateRequest, CommandError, ConfigPatch, SendMessageRequest};
pub use ports::{ChallengeRenderer, DriverEvent, SessionDriver, WebhookPort};
pub use session::{LifecycleEvent, SessionState};

use contacts::RefreshGuard;
use lifecycle::RecoveryGate;
use protocol::{BehaviorConfig, SessionStatus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Delay between the best-effort logout and re-initialization during recovery.
pub const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct GatewayOptions {
    pub recovery_delay: Duration,
    /// Capacity of the observer broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            recovery_delay: DEFAULT_RECOVERY_DELAY,
            broadcast_capacity: 64,
        }
    }
}

/// Headless gateway core: consumes driver events, owns session state, serves commands.
///
/// All process-wide state lives here and is handed around as `Arc<Gateway>`.
/// Locks are never held across a driver await.
pub struct Gateway {
    driver: Arc<dyn SessionDriver>,
    webhook: Arc<dyn WebhookPort>,
    renderer: Arc<dyn ChallengeRenderer>,
    state: RwLock<SessionState>,
    config: RwLock<BehaviorConfig>,
    hub: SubscriberHub,
    options: GatewayOptions,
    /// Bumped on every accepted lifecycle transition; background results computed
    /// under an older generation are discarded.
    generation: AtomicU64,
    recovery: RecoveryGate,
    refresh: RefreshGuard,
}

impl Gateway {
    pub fn new(
        driver: Arc<dyn SessionDriver>,
        webhook: Arc<dyn WebhookPort>,
        renderer: Arc<dyn ChallengeRenderer>,
        options: GatewayOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            driver,
            webhook,
            renderer,
            state: RwLock::new(SessionState::new()),
            config: RwLock::new(BehaviorConfig::default()),
            hub: SubscriberHub::new(options.broadcast_capacity),
            options,
            generation: AtomicU64::new(0),
            recovery: RecoveryGate::default(),
            refresh: RefreshGuard::default(),
        })
    }

    pub async fn current_status(&self) -> SessionStatus {
        self.state.read().await.status()
    }

    pub async fn behavior_config(&self) -> BehaviorConfig {
        *self.config.read().await
    }

    pub fn hub(&self) -> &SubscriberHub {
        &self.hub
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}
