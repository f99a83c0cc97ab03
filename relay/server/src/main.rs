mod config;
mod driver;
mod qr;
mod routes;
mod webhook;
mod websocket;

use anyhow::Result;
use dotenvy::dotenv;
use relay_core::ports::TransientErrorGuard;
use relay_core::{DriverEvent, Gateway, GatewayOptions};
use std::{env, net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::GatewayConfig;
use driver::SidecarDriver;
use qr::QrRenderer;
use webhook::HttpWebhook;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env::var("RUST_LOG").unwrap_or_else(|_| {
            "wa_relay_server=info,relay_core=info,tower_http=debug".into()
        })))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("wa-relay-server v{}", env!("CARGO_PKG_VERSION"));
    let config = GatewayConfig::from_env()?;

    let (events_tx, events_rx) = mpsc::channel::<DriverEvent>(256);
    let (sidecar, mut linked) = SidecarDriver::spawn(config.driver_ws_url.clone(), events_tx);

    let gateway = Gateway::new(
        Arc::new(TransientErrorGuard::new(sidecar)),
        Arc::new(HttpWebhook::new(config.webhook_url.clone())),
        Arc::new(QrRenderer),
        GatewayOptions {
            recovery_delay: config.recovery_delay,
            ..GatewayOptions::default()
        },
    );
    tokio::spawn(gateway.clone().run(events_rx));

    // (Re)initialize the session each time the sidecar link comes up.
    let starter = gateway.clone();
    tokio::spawn(async move {
        loop {
            if linked.wait_for(|up| *up).await.is_err() {
                break;
            }
            starter.start().await;
            if linked.wait_for(|up| !*up).await.is_err() {
                break;
            }
        }
    });

    let app = routes::router(AppState { gateway }, &config.base_path);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Server listening on {}", addr);
    if !config.base_path.is_empty() {
        info!("API also mounted under {}", config.base_path);
    }
    info!("Driver sidecar: {}", config.driver_ws_url);
    info!("Webhook target: {}", config.webhook_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
