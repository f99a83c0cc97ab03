//! In-crate mocks for tests and local demos.

use crate::ports::{ChallengeRenderer, ChatSummary, PresenceState, SessionDriver, WebhookPort};
use crate::{Gateway, GatewayOptions};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use protocol::WebhookPayload;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Initialize,
    Logout,
    SendMessage { chat_id: String, body: String },
    GetNumberId(String),
    GetChats,
    GetProfilePicUrl(String),
    GetContactNumber(String),
    MarkRead(String),
    SetChatState { chat_id: String, state: PresenceState },
    RejectCall(String),
}

#[derive(Default)]
struct DriverInner {
    calls: Vec<DriverCall>,
    chats: Vec<ChatSummary>,
    unregistered: HashSet<String>,
    contact_numbers: HashMap<String, String>,
    profile_pic: Option<String>,
    failures: HashMap<&'static str, String>,
}

/// Scriptable driver that records every call. Clones share state.
#[derive(Clone, Default)]
pub struct MockDriver {
    inner: Arc<Mutex<DriverInner>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&DriverCall) -> bool) -> usize {
        self.inner.lock().unwrap().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn set_chats(&self, chats: Vec<ChatSummary>) {
        self.inner.lock().unwrap().chats = chats;
    }

    /// Numbers for which `get_number_id` answers `None`.
    pub fn set_unregistered(&self, number: &str) {
        self.inner.lock().unwrap().unregistered.insert(number.to_string());
    }

    pub fn set_contact_number(&self, id: &str, number: &str) {
        self.inner
            .lock()
            .unwrap()
            .contact_numbers
            .insert(id.to_string(), number.to_string());
    }

    pub fn set_profile_pic(&self, url: &str) {
        self.inner.lock().unwrap().profile_pic = Some(url.to_string());
    }

    pub fn fail_initialize_with(&self, msg: &str) {
        self.fail("initialize", msg);
    }

    pub fn fail_logout_with(&self, msg: &str) {
        self.fail("logout", msg);
    }

    pub fn fail_send_with(&self, msg: &str) {
        self.fail("send_message", msg);
    }

    pub fn fail_chats_with(&self, msg: &str) {
        self.fail("get_chats", msg);
    }

    pub fn fail_profile_pic_with(&self, msg: &str) {
        self.fail("get_profile_pic_url", msg);
    }

    pub fn fail_contact_lookup_with(&self, msg: &str) {
        self.fail("get_contact_number", msg);
    }

    pub fn fail_mark_read_with(&self, msg: &str) {
        self.fail("mark_read", msg);
    }

    pub fn fail_reject_call_with(&self, msg: &str) {
        self.fail("reject_call", msg);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().unwrap().failures.clear();
    }

    fn fail(&self, op: &'static str, msg: &str) {
        self.inner.lock().unwrap().failures.insert(op, msg.to_string());
    }

    fn record(&self, op: &'static str, call: DriverCall) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(call);
        match inner.failures.get(op) {
            Some(msg) => Err(anyhow!(msg.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionDriver for MockDriver {
    async fn initialize(&self) -> Result<()> {
        self.record("initialize", DriverCall::Initialize)
    }

    async fn logout(&self) -> Result<()> {
        self.record("logout", DriverCall::Logout)
    }

    async fn send_message(&self, chat_id: &str, body: &str) -> Result<serde_json::Value> {
        self.record(
            "send_message",
            DriverCall::SendMessage { chat_id: chat_id.to_string(), body: body.to_string() },
        )?;
        Ok(serde_json::json!({ "id": format!("true_{}_MOCK", chat_id), "ack": 1 }))
    }

    async fn get_number_id(&self, number: &str) -> Result<Option<String>> {
        self.record("get_number_id", DriverCall::GetNumberId(number.to_string()))?;
        let inner = self.inner.lock().unwrap();
        if inner.unregistered.contains(number) {
            return Ok(None);
        }
        Ok(Some(format!("{}@c.us", number)))
    }

    async fn get_chats(&self) -> Result<Vec<ChatSummary>> {
        self.record("get_chats", DriverCall::GetChats)?;
        Ok(self.inner.lock().unwrap().chats.clone())
    }

    async fn get_profile_pic_url(&self, id: &str) -> Result<String> {
        self.record("get_profile_pic_url", DriverCall::GetProfilePicUrl(id.to_string()))?;
        Ok(self.inner.lock().unwrap().profile_pic.clone().unwrap_or_default())
    }

    async fn get_contact_number(&self, id: &str) -> Result<Option<String>> {
        self.record("get_contact_number", DriverCall::GetContactNumber(id.to_string()))?;
        Ok(self.inner.lock().unwrap().contact_numbers.get(id).cloned())
    }

    async fn mark_read(&self, chat_id: &str) -> Result<()> {
        self.record("mark_read", DriverCall::MarkRead(chat_id.to_string()))
    }

    async fn set_chat_state(&self, chat_id: &str, state: PresenceState) -> Result<()> {
        self.record(
            "set_chat_state",
            DriverCall::SetChatState { chat_id: chat_id.to_string(), state },
        )
    }

    async fn reject_call(&self, call_id: &str) -> Result<()> {
        self.record("reject_call", DriverCall::RejectCall(call_id.to_string()))
    }
}

/// Records every attempted delivery; can be told to fail like a dead endpoint.
#[derive(Clone, Default)]
pub struct MockWebhook {
    attempts: Arc<Mutex<Vec<WebhookPayload>>>,
    failing: Arc<Mutex<Option<String>>>,
    notify: Arc<Notify>,
}

impl MockWebhook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(msg: &str) -> Self {
        let webhook = Self::default();
        *webhook.failing.lock().unwrap() = Some(msg.to_string());
        webhook
    }

    pub fn attempts(&self) -> Vec<WebhookPayload> {
        self.attempts.lock().unwrap().clone()
    }

    /// Waits until at least `n` deliveries were attempted.
    pub async fn wait_for_attempts(&self, n: usize) -> Vec<WebhookPayload> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let attempts = self.attempts();
            if attempts.len() >= n {
                return attempts;
            }
            if tokio::time::timeout_at(deadline, self.notify.notified()).await.is_err() {
                panic!("expected {} webhook attempts, saw {}", n, attempts.len());
            }
        }
    }
}

#[async_trait]
impl WebhookPort for MockWebhook {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<()> {
        self.attempts.lock().unwrap().push(payload.clone());
        self.notify.notify_one();
        let failing = self.failing.lock().unwrap().clone();
        match failing {
            Some(msg) => Err(anyhow!(msg)),
            None => Ok(()),
        }
    }
}

/// Renders a challenge as a fake data URI; optionally always fails.
#[derive(Clone, Default)]
pub struct StaticRenderer {
    fail: bool,
}

impl StaticRenderer {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

impl ChallengeRenderer for StaticRenderer {
    fn render(&self, payload: &str) -> Result<String> {
        if self.fail {
            return Err(anyhow!("cannot encode challenge"));
        }
        Ok(rendered(payload))
    }
}

pub fn rendered(payload: &str) -> String {
    format!("data:image/png;base64,{}", payload)
}

/// Options used by test gateways: a short recovery delay.
pub fn test_options() -> GatewayOptions {
    GatewayOptions {
        recovery_delay: Duration::from_millis(10),
        ..GatewayOptions::default()
    }
}

pub fn gateway() -> (Arc<Gateway>, MockDriver, MockWebhook) {
    build(MockWebhook::new(), StaticRenderer::default(), test_options())
}

pub fn gateway_with_webhook(webhook: MockWebhook) -> (Arc<Gateway>, MockDriver, MockWebhook) {
    build(webhook, StaticRenderer::default(), test_options())
}

pub fn gateway_with_renderer(renderer: StaticRenderer) -> (Arc<Gateway>, MockDriver, MockWebhook) {
    build(MockWebhook::new(), renderer, test_options())
}

pub fn gateway_with_delay(recovery_delay: Duration) -> (Arc<Gateway>, MockDriver, MockWebhook) {
    let options = GatewayOptions { recovery_delay, ..GatewayOptions::default() };
    build(MockWebhook::new(), StaticRenderer::default(), options)
}

fn build(
    webhook: MockWebhook,
    renderer: StaticRenderer,
    options: GatewayOptions,
) -> (Arc<Gateway>, MockDriver, MockWebhook) {
    let driver = MockDriver::new();
    let gateway = Gateway::new(
        Arc::new(driver.clone()),
        Arc::new(webhook.clone()),
        Arc::new(renderer),
        options,
    );
    (gateway, driver, webhook)
}

/// Polls `check` until it holds, panicking after two seconds.
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
