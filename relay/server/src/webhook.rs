use anyhow::{bail, Result};
use async_trait::async_trait;
use protocol::WebhookPayload;
use relay_core::WebhookPort;
use tracing::debug;

/// Posts relayed messages to the downstream webhook as JSON.
#[derive(Debug, Clone)]
pub struct HttpWebhook {
    client: reqwest::Client,
    url: String,
}

impl HttpWebhook {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl WebhookPort for HttpWebhook {
    async fn deliver(&self, payload: &WebhookPayload) -> Result<()> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("webhook answered {}: {}", status, body);
        }
        debug!("Webhook accepted message from {}", payload.phone);
        Ok(())
    }
}
