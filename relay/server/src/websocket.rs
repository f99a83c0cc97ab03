use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use protocol::{ClientEvent, ServerEvent};
use relay_core::Subscription;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    Extension(state): Extension<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| websocket_handler(socket, state))
}

async fn websocket_handler(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4().to_string();
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(256);

    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode push frame: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let Subscription { replay, mut live } = state.gateway.subscribe().await;
    info!("Observer connected: {}", conn_id);
    for event in replay {
        let _ = tx.send(event).await;
    }

    let tx_live = tx.clone();
    let gateway = state.gateway.clone();
    let live_task = tokio::spawn(async move {
        loop {
            match live.recv().await {
                Ok(event) => {
                    if tx_live.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // catch up with a fresh snapshot instead of the dropped frames
                    warn!("Observer lagged by {} frames; resending snapshot", skipped);
                    for event in gateway.snapshot_events().await {
                        if tx_live.send(event).await.is_err() {
                            return;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(msg) = ws_receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                debug!("WebSocket error on {}: {}", conn_id, e);
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::GetContacts) => {
                    if let Some(contacts) = state.gateway.request_contacts().await {
                        let _ = tx.send(ServerEvent::Contacts(contacts)).await;
                    }
                }
                Err(_) => debug!("Ignoring observer frame: {}", text),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    live_task.abort();
    send_task.abort();
    info!("Observer disconnected: {}", conn_id);
}

#[cfg(test)]
mod tests {
    use crate::{routes, AppState};
    use futures::{SinkExt, StreamExt};
    use protocol::{ServerEvent, SessionStatus};
    use relay_core::mocks;
    use relay_core::ports::{ChatSummary, SessionIdentity};
    use relay_core::DriverEvent;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;

    async fn next_event<S>(ws: &mut S) -> ServerEvent
    where
        S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
                .await
                .expect("frame in time")
                .expect("stream open")
                .expect("valid frame");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn observer_gets_snapshot_then_contacts_on_request() {
        let (gateway, driver, _webhook) = mocks::gateway();
        driver.set_chats(vec![ChatSummary {
            id: "15550001@c.us".into(),
            user: "15550001".into(),
            name: Some("Ana".into()),
            contact_pushname: None,
            is_group: false,
            unread_count: 0,
            last_message: None,
        }]);
        gateway.handle_event(DriverEvent::Authenticated).await;
        gateway
            .handle_event(DriverEvent::Ready(SessionIdentity {
                wid: "15550000@c.us".into(),
                pushname: "Relay".into(),
                platform: "android".into(),
            }))
            .await;
        gateway.refresh_contacts().await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = routes::router(AppState { gateway: gateway.clone() }, "/wa-api");
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/wa-api/ws", addr))
            .await
            .unwrap();

        match next_event(&mut ws).await {
            ServerEvent::Status(payload) => assert_eq!(payload.status, SessionStatus::Connected),
            other => panic!("expected status first, got {:?}", other),
        }
        match next_event(&mut ws).await {
            ServerEvent::Contacts(contacts) => assert_eq!(contacts[0].display_name, "Ana"),
            other => panic!("expected contacts, got {:?}", other),
        }

        ws.send(Message::Text(r#"{"event":"get_contacts"}"#.into())).await.unwrap();
        match next_event(&mut ws).await {
            ServerEvent::Contacts(contacts) => assert_eq!(contacts.len(), 1),
            other => panic!("expected contacts, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn observer_sees_live_transitions() {
        let (gateway, _driver, _webhook) = mocks::gateway();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = routes::router(AppState { gateway: gateway.clone() }, "");
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        assert!(matches!(next_event(&mut ws).await, ServerEvent::Status(_)));

        gateway.handle_event(DriverEvent::Qr("2@abc".into())).await;
        assert_eq!(next_event(&mut ws).await, ServerEvent::Qr(mocks::rendered("2@abc")));
        match next_event(&mut ws).await {
            ServerEvent::Status(payload) => assert_eq!(payload.status, SessionStatus::QrReady),
            other => panic!("expected status, got {:?}", other),
        }
    }
}
