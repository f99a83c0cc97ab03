use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use relay_core::ports::{ChatSummary, PresenceState};
use relay_core::{DriverEvent, SessionDriver};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

type PendingReplies = HashMap<u64, oneshot::Sender<Result<Value, String>>>;

/// Reply to a command frame.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl Reply {
    fn into_result(self) -> Result<Value, String> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(self.error.unwrap_or_else(|| "driver command failed".to_string()))
        }
    }
}

/// Frames the sidecar pushes to us.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Reply(Reply),
    Event(DriverEvent),
}

pub fn encode_request(id: u64, cmd: &str, args: Value) -> String {
    json!({ "id": id, "cmd": cmd, "args": args }).to_string()
}

pub fn parse_frame(text: &str) -> Option<Inbound> {
    serde_json::from_str(text).ok()
}

/// Reconnect delay in seconds: 2, 4, 8, 16, then capped at 30.
fn backoff_secs(attempt: u32) -> u64 {
    std::cmp::min(30, 1u64 << std::cmp::min(5, attempt.max(1)))
}

/// Session driver backed by a browser-automation sidecar reached over a WebSocket.
///
/// Commands are correlated with replies by id. While the link is down, commands fail
/// immediately; lifecycle and inbound events are forwarded onto the event bus.
#[derive(Clone)]
pub struct SidecarDriver {
    link: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
    pending: Arc<Mutex<PendingReplies>>,
    next_id: Arc<AtomicU64>,
}

impl SidecarDriver {
    /// Starts the link task. The returned watch flips to `true` every time the link comes up.
    pub fn spawn(url: String, events: mpsc::Sender<DriverEvent>) -> (Self, watch::Receiver<bool>) {
        let driver = Self {
            link: Arc::new(Mutex::new(None)),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        };
        let (linked_tx, linked_rx) = watch::channel(false);
        tokio::spawn(driver.clone().run_link(url, events, linked_tx));
        (driver, linked_rx)
    }

    async fn run_link(self, url: String, events: mpsc::Sender<DriverEvent>, linked: watch::Sender<bool>) {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match connect_async(url.as_str()).await {
                Ok((stream, _)) => {
                    attempt = 0;
                    info!("Driver link up: {}", url);
                    let (mut write, mut read) = stream.split();
                    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
                    *self.link.lock().await = Some(out_tx);
                    let _ = linked.send(true);

                    let writer = tokio::spawn(async move {
                        while let Some(frame) = out_rx.recv().await {
                            if write.send(Message::Text(frame)).await.is_err() {
                                break;
                            }
                        }
                    });

                    while let Some(msg) = read.next().await {
                        match msg {
                            Ok(Message::Text(text)) => self.dispatch(&text, &events).await,
                            Ok(Message::Close(_)) => break,
                            Err(e) => {
                                warn!("Driver link error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }

                    writer.abort();
                    self.link.lock().await.take();
                    let _ = linked.send(false);
                    self.fail_pending("driver link closed").await;
                    warn!("Driver link lost");
                    if events
                        .send(DriverEvent::Disconnected("SIDECAR_LINK_LOST".to_string()))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Err(e) => warn!("Driver link connect failed (attempt {}): {}", attempt, e),
            }
            if events.is_closed() {
                return;
            }
            let delay = backoff_secs(attempt);
            debug!("Reconnecting driver link in {}s", delay);
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    async fn dispatch(&self, text: &str, events: &mpsc::Sender<DriverEvent>) {
        match parse_frame(text) {
            Some(Inbound::Reply(reply)) => {
                let waiter = self.pending.lock().await.remove(&reply.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(reply.into_result());
                    }
                    None => debug!("Dropping reply for unknown command {}", reply.id),
                }
            }
            Some(Inbound::Event(event)) => {
                debug!("Driver event: {}", event.kind());
                let _ = events.send(event).await;
            }
            None => warn!("Unrecognized driver frame: {}", text),
        }
    }

    async fn fail_pending(&self, reason: &str) {
        for (_, tx) in self.pending.lock().await.drain() {
            let _ = tx.send(Err(reason.to_string()));
        }
    }

    async fn call(&self, cmd: &str, args: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = match self.link.lock().await.as_ref() {
            Some(out) => out.send(encode_request(id, cmd, args)).is_ok(),
            None => false,
        };
        if !sent {
            self.pending.lock().await.remove(&id);
            bail!("driver link is down; {} not sent", cmd);
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(msg)) => Err(anyhow!(msg)),
            Err(_) => bail!("driver link closed before {} completed", cmd),
        }
    }

    async fn call_as<T: for<'de> Deserialize<'de>>(&self, cmd: &str, args: Value) -> Result<T> {
        let value = self.call(cmd, args).await?;
        serde_json::from_value(value).map_err(|e| anyhow!("malformed {} result: {}", cmd, e))
    }
}

#[async_trait]
impl SessionDriver for SidecarDriver {
    async fn initialize(&self) -> Result<()> {
        self.call("initialize", json!({})).await.map(|_| ())
    }

    async fn logout(&self) -> Result<()> {
        self.call("logout", json!({})).await.map(|_| ())
    }

    async fn send_message(&self, chat_id: &str, body: &str) -> Result<Value> {
        self.call("send_message", json!({ "chat_id": chat_id, "body": body })).await
    }

    async fn get_number_id(&self, number: &str) -> Result<Option<String>> {
        self.call_as("get_number_id", json!({ "number": number })).await
    }

    async fn get_chats(&self) -> Result<Vec<ChatSummary>> {
        self.call_as("get_chats", json!({})).await
    }

    async fn get_profile_pic_url(&self, id: &str) -> Result<String> {
        let url: Option<String> = self.call_as("get_profile_pic_url", json!({ "id": id })).await?;
        Ok(url.unwrap_or_default())
    }

    async fn get_contact_number(&self, id: &str) -> Result<Option<String>> {
        self.call_as("get_contact_number", json!({ "id": id })).await
    }

    async fn mark_read(&self, chat_id: &str) -> Result<()> {
        self.call("mark_read", json!({ "chat_id": chat_id })).await.map(|_| ())
    }

    async fn set_chat_state(&self, chat_id: &str, state: PresenceState) -> Result<()> {
        self.call("set_chat_state", json!({ "chat_id": chat_id, "state": state.as_str() }))
            .await
            .map(|_| ())
    }

    async fn reject_call(&self, call_id: &str) -> Result<()> {
        self.call("reject_call", json!({ "call_id": call_id })).await.map(|_| ())
    }
}
