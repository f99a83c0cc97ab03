use super::{ChatSummary, PresenceState, SessionDriver};
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

/// Driver errors that resolve themselves on the next page navigation.
pub const TRANSIENT_NAVIGATION_ERRORS: &[&str] = &["Execution context was destroyed"];

pub fn is_transient(err: &anyhow::Error) -> bool {
    let text = format!("{:#}", err);
    TRANSIENT_NAVIGATION_ERRORS.iter().any(|needle| text.contains(needle))
}

/// Wraps a driver and swallows allow-listed navigation errors.
///
/// Only `initialize` (page injection races a navigation) and `mark_read`
/// (stale chat handle during navigation) are guarded. Every other call is passed
/// through untouched.
pub struct TransientErrorGuard<D> {
    inner: D,
}

impl<D: SessionDriver> TransientErrorGuard<D> {
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: SessionDriver> SessionDriver for TransientErrorGuard<D> {
    async fn initialize(&self) -> Result<()> {
        match self.inner.initialize().await {
            Err(e) if is_transient(&e) => {
                info!("Ignored navigation error during initialize, will retry on next navigation: {:#}", e);
                Ok(())
            }
            other => other,
        }
    }

    async fn logout(&self) -> Result<()> {
        self.inner.logout().await
    }

    async fn send_message(&self, chat_id: &str, body: &str) -> Result<serde_json::Value> {
        self.inner.send_message(chat_id, body).await
    }

    async fn get_number_id(&self, number: &str) -> Result<Option<String>> {
        self.inner.get_number_id(number).await
    }

    async fn get_chats(&self) -> Result<Vec<ChatSummary>> {
        self.inner.get_chats().await
    }

    async fn get_profile_pic_url(&self, id: &str) -> Result<String> {
        self.inner.get_profile_pic_url(id).await
    }

    async fn get_contact_number(&self, id: &str) -> Result<Option<String>> {
        self.inner.get_contact_number(id).await
    }

    async fn mark_read(&self, chat_id: &str) -> Result<()> {
        match self.inner.mark_read(chat_id).await {
            Err(e) if is_transient(&e) => {
                info!("Ignored mark-read error for {}: {:#}", chat_id, e);
                Ok(())
            }
            other => other,
        }
    }

    async fn set_chat_state(&self, chat_id: &str, state: PresenceState) -> Result<()> {
        self.inner.set_chat_state(chat_id, state).await
    }

    async fn reject_call(&self, call_id: &str) -> Result<()> {
        self.inner.reject_call(call_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{DriverCall, MockDriver};

    #[tokio::test]
    async fn swallows_navigation_error_on_initialize() {
        let driver = MockDriver::new();
        driver.fail_initialize_with("Protocol error: Execution context was destroyed, most likely because of a navigation");
        let guard = TransientErrorGuard::new(driver);

        assert!(guard.initialize().await.is_ok());
        assert_eq!(guard.inner().calls(), vec![DriverCall::Initialize]);
    }

    #[tokio::test]
    async fn other_initialize_errors_pass_through() {
        let driver = MockDriver::new();
        driver.fail_initialize_with("Failed to launch the browser process");
        let guard = TransientErrorGuard::new(driver);

        let err = guard.initialize().await.unwrap_err();
        assert!(err.to_string().contains("Failed to launch"));
    }

    #[test]
    fn matches_wrapped_errors() {
        let err = anyhow::anyhow!("Execution context was destroyed").context("inject failed");
        assert!(is_transient(&err));
        assert!(!is_transient(&anyhow::anyhow!("timeout")));
    }
}
