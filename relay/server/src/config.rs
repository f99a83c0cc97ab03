use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub port: u16,
    pub webhook_url: String,
    /// Sub-path the API is also mounted under, e.g. `/wa-api`. Empty disables it.
    pub base_path: String,
    pub driver_ws_url: String,
    pub recovery_delay: Duration,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port: u16 = lookup("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .context("PORT must be a port number")?;
        let webhook_url = lookup("WEBHOOK_URL")
            .unwrap_or_else(|| "http://127.0.0.1:8000/whatsapp/webhook".to_string());
        let base_path = normalize_base_path(
            &lookup("BASE_PATH").unwrap_or_else(|| "/wa-api".to_string()),
        );
        let driver_ws_url = lookup("DRIVER_WS_URL")
            .unwrap_or_else(|| "ws://127.0.0.1:3100/driver".to_string());
        let recovery_delay_ms: u64 = lookup("RECOVERY_DELAY_MS")
            .unwrap_or_else(|| "1000".to_string())
            .parse()
            .context("RECOVERY_DELAY_MS must be a number of milliseconds")?;

        Ok(Self {
            port,
            webhook_url,
            base_path,
            driver_ws_url,
            recovery_delay: Duration::from_millis(recovery_delay_ms),
        })
    }
}

/// `wa-api/` -> `/wa-api`; `/` and blank disable the prefix.
fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.base_path, "/wa-api");
        assert_eq!(cfg.webhook_url, "http://127.0.0.1:8000/whatsapp/webhook");
        assert_eq!(cfg.driver_ws_url, "ws://127.0.0.1:3100/driver");
        assert_eq!(cfg.recovery_delay, Duration::from_millis(1000));
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("PORT", "8080"),
            ("WEBHOOK_URL", "https://crm.example/hook"),
            ("BASE_PATH", "bridge/"),
            ("RECOVERY_DELAY_MS", "250"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.webhook_url, "https://crm.example/hook");
        assert_eq!(cfg.base_path, "/bridge");
        assert_eq!(cfg.recovery_delay, Duration::from_millis(250));
    }

    #[test]
    fn root_base_path_disables_prefix() {
        assert_eq!(config(&[("BASE_PATH", "/")]).unwrap().base_path, "");
        assert_eq!(config(&[("BASE_PATH", "")]).unwrap().base_path, "");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(config(&[("PORT", "http")]).is_err());
        assert!(config(&[("RECOVERY_DELAY_MS", "soon")]).is_err());
    }
}
