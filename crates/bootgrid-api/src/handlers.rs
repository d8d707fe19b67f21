//! HTTP handlers.
//!
//! Provisioning work (registry, filesystem, rendering) is blocking and runs
//! on the blocking pool. Failures answer with a bare status code; boot
//! firmware has no use for an error body.

use std::net::SocketAddr;

use axum::Json;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use boot_core::Stage;
use bootgrid_provision::RawRequest;
use tracing::error;

use crate::{body, ApiState};

/// Response wrapper for JSON endpoints.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Provisioning ───────────────────────────────────────────────

/// GET /provision/{hwaddr}?stage=..
pub async fn provision(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path(hwaddr): Path<String>,
    Query(mut raw): Query<RawRequest>,
) -> Response {
    raw.hwaddr = Some(hwaddr);
    serve(state, raw, remote).await
}

/// GET /{stage}/{hwaddr}
pub async fn stage_alias(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path((prefix, hwaddr)): Path<(String, String)>,
    Query(mut raw): Query<RawRequest>,
) -> Response {
    raw.stage = Some(stage_for_prefix(&prefix).to_string());
    raw.hwaddr = Some(hwaddr);
    serve(state, raw, remote).await
}

/// GET /efiboot/{file}
pub async fn efiboot(
    State(state): State<ApiState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    Path(file): Path<String>,
    Query(mut raw): Query<RawRequest>,
) -> Response {
    let neighbors = state.neighbors.clone();
    let ip = remote.ip().to_canonical();
    // A missing entry leaves hwaddr unset, which the parser rejects.
    raw.hwaddr = tokio::task::spawn_blocking(move || neighbors.hwaddr(ip))
        .await
        .unwrap_or_else(|err| {
            error!(%err, "neighbour lookup task failed");
            None
        });
    raw.stage = Some(Stage::Efiboot.token().to_string());
    raw.efifile = Some(file);
    serve(state, raw, remote).await
}

/// Overlay routes use a longer prefix than their stage token.
fn stage_for_prefix(prefix: &str) -> &str {
    match prefix {
        "overlay-system" => Stage::System.token(),
        "overlay-runtime" => Stage::Runtime.token(),
        other => other,
    }
}

async fn serve(state: ApiState, raw: RawRequest, remote: SocketAddr) -> Response {
    let provisioner = state.provisioner.clone();
    match tokio::task::spawn_blocking(move || provisioner.handle(&raw, remote)).await {
        Ok(Ok(delivery)) => body::respond(delivery).await,
        Ok(Err(err)) => err.status().into_response(),
        Err(err) => {
            error!(%err, "provisioning task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ── Status ─────────────────────────────────────────────────────

/// GET /status
pub async fn status(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.latest_status() {
        Ok(latest) => ApiResponse::ok(latest).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
