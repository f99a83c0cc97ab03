use crate::{websocket::handle_websocket, AppState};
use axum::{
    extract::{Extension, Json},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use relay_core::{ChatStateRequest, CommandError, ConfigPatch, SendMessageRequest};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};

/// Builds the HTTP surface. Every route is served at the root and, when `base_path`
/// is non-empty, again under that prefix.
pub fn router(state: AppState, base_path: &str) -> Router {
    let api = Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/send-message", post(send_message))
        .route("/reset-session", post(reset_session))
        .route("/config", post(update_config))
        .route("/chat-state", post(chat_state))
        .route("/ws", get(handle_websocket));

    let app = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api.clone()).merge(api)
    };

    app.layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any),
    )
    .layer(Extension(state))
}

/// Maps a command failure onto its status code; `driver_body` shapes the 500 body.
fn command_error(
    err: CommandError,
    driver_body: impl FnOnce(String) -> Value,
) -> (StatusCode, Json<Value>) {
    match err {
        CommandError::BadRequest(msg) => (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))),
        CommandError::ServiceUnavailable(msg) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": msg })))
        }
        CommandError::Driver(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(driver_body(e.to_string()))),
    }
}

async fn root() -> impl IntoResponse {
    "WhatsApp API Server is running"
}

async fn status(Extension(state): Extension<AppState>) -> impl IntoResponse {
    Json(state.gateway.status().await)
}

async fn send_message(
    Extension(state): Extension<AppState>,
    payload: Option<Json<SendMessageRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    match state.gateway.send_message(request).await {
        Ok(response) => (StatusCode::OK, Json(json!({ "success": true, "response": response }))),
        Err(e) => command_error(e, |details| {
            json!({ "error": "Failed to send message", "details": details })
        }),
    }
}

async fn reset_session(Extension(state): Extension<AppState>) -> impl IntoResponse {
    match state.gateway.reset().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => command_error(e, |error| json!({ "success": false, "error": error })),
    }
}

async fn update_config(
    Extension(state): Extension<AppState>,
    payload: Option<Json<ConfigPatch>>,
) -> impl IntoResponse {
    let patch = payload.map(|Json(p)| p).unwrap_or_default();
    let config = state.gateway.update_config(patch).await;
    Json(json!({ "success": true, "config": config }))
}

async fn chat_state(
    Extension(state): Extension<AppState>,
    payload: Option<Json<ChatStateRequest>>,
) -> impl IntoResponse {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    match state.gateway.set_chat_state(request).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))),
        Err(e) => command_error(e, |error| json!({ "error": error })),
    }
}
