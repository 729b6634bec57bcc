use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::command::PlayerCommand;
use crate::session::MediaBridge;
use crate::snapshot;

pub fn router(bridge: MediaBridge) -> Router {
    Router::new()
        .route("/current-media", get(current_media))
        .route("/control", post(control))
        .layer(middleware::from_fn(allow_any_origin))
        .with_state(bridge)
}

pub async fn serve(bridge: MediaBridge, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("media bridge listening on {addr}");
    axum::serve(listener, router(bridge))
        .await
        .context("server error")
}

/// The widget frontend is served from a different origin.
async fn allow_any_origin(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    response
}

async fn current_media(State(bridge): State<MediaBridge>) -> Response {
    match bridge.snapshot().await {
        Ok(raw) => Json(snapshot::assemble(raw)).into_response(),
        Err(err) => {
            error!("session query failed: {err:#}");
            server_error(&err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ControlRequest {
    command: Option<String>,
}

#[derive(Debug, Serialize)]
struct ControlResponse {
    success: bool,
}

async fn control(
    State(bridge): State<MediaBridge>,
    Json(request): Json<ControlRequest>,
) -> Response {
    let Some(token) = request.command else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No command provided" })),
        )
            .into_response();
    };

    // Unknown tokens never reach the session; they are a failed command.
    let Some(command) = PlayerCommand::parse(&token) else {
        return Json(ControlResponse { success: false }).into_response();
    };

    match bridge.control(command).await {
        Ok(success) => Json(ControlResponse { success }).into_response(),
        Err(err) => {
            error!("control dispatch failed: {err:#}");
            server_error(&err)
        }
    }
}

fn server_error(err: &anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("{err:#}") })),
    )
        .into_response()
}
