//! Mock video data service.
//!
//! A stateless stand-in for the real video platform backend: a fixed device
//! catalog behind the REST endpoints the video tools call. Used by the
//! `mock-video-service` binary for local development and served in-process
//! as the test double for the tools.

pub mod catalog;

use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

pub use catalog::{filter_devices, fixture_devices, Device};

/// Environment variable holding the mock service port.
pub const PORT_ENV: &str = "MOCK_VIDEO_SERVICE_PORT";

/// Default mock service port (matches the tools' default base URL).
pub const DEFAULT_PORT: u16 = 8001;

const NOT_FOUND: &str = "设备不存在";

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct MockState {
    devices: Arc<Vec<Device>>,
    /// Base used when minting proxy/playback/HLS URLs, e.g. `http://localhost:8001`.
    public_base: String,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceQuery {
    #[serde(rename = "type")]
    device_type: Option<String>,
    status: Option<String>,
    keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaybackQuery {
    start_time: String,
    end_time: String,
}

#[derive(Debug, Default, Deserialize)]
struct StreamUrlQuery {
    device_id: Option<String>,
    name: Option<String>,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the mock service router. `public_base` prefixes generated URLs.
pub fn router(public_base: &str) -> Router {
    let state = MockState {
        devices: Arc::new(fixture_devices()),
        public_base: public_base.trim_end_matches('/').to_string(),
    };

    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:device_id", get(device_info))
        .route("/api/devices/:device_id/live-view", post(live_view))
        .route("/api/devices/:device_id/playback", post(playback))
        .route("/api/stream-url", get(stream_url))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Serve the router on an already-bound listener until `shutdown` resolves.
pub async fn serve(
    listener: tokio::net::TcpListener,
    public_base: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(public_base))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    if let Some(query) = req.uri().query() {
        tracing::debug!(%method, %path, query, "request started");
    } else {
        tracing::debug!(%method, %path, "request started");
    }

    let response = next.run(req).await;

    tracing::info!(
        %method,
        %path,
        status = response.status().as_u16(),
        "request finished"
    );
    response
}

// ─── Handlers ────────────────────────────────────────────────────────────────

async fn list_devices(
    State(state): State<MockState>,
    Query(query): Query<DeviceQuery>,
) -> Json<Value> {
    let matched = filter_devices(
        &state.devices,
        query.device_type.as_deref(),
        query.status.as_deref(),
        query.keyword.as_deref(),
    );
    tracing::debug!(total = matched.len(), "filtered devices");

    Json(json!({
        "success": true,
        "data": matched,
        "total": matched.len(),
    }))
}

async fn device_info(
    State(state): State<MockState>,
    Path(device_id): Path<String>,
) -> Json<Value> {
    match catalog::find_by_id(&state.devices, &device_id) {
        Some(device) => Json(json!({ "success": true, "data": device })),
        None => Json(not_found()),
    }
}

async fn live_view(
    State(state): State<MockState>,
    Path(device_id): Path<String>,
) -> Json<Value> {
    match catalog::find_by_id(&state.devices, &device_id) {
        Some(device) => Json(json!({
            "success": true,
            "rtsp_url": device.rtsp_url,
            "proxy_url": format!("{}/rtsp/{device_id}", state.public_base),
        })),
        None => Json(not_found()),
    }
}

async fn playback(
    State(state): State<MockState>,
    Path(device_id): Path<String>,
    Query(query): Query<PlaybackQuery>,
) -> Json<Value> {
    if catalog::find_by_id(&state.devices, &device_id).is_none() {
        return Json(not_found());
    }

    Json(json!({
        "success": true,
        "playback_url": format!(
            "{}/playback/{device_id}/{}/{}",
            state.public_base, query.start_time, query.end_time
        ),
    }))
}

async fn stream_url(
    State(state): State<MockState>,
    Query(query): Query<StreamUrlQuery>,
) -> Json<Value> {
    let device_id = query.device_id.filter(|s| !s.is_empty());
    let name = query.name.filter(|s| !s.is_empty());

    let device = match (device_id, name) {
        (None, None) => {
            return Json(json!({
                "success": false,
                "error": "必须提供device_id或name参数",
            }))
        }
        (Some(id), _) => catalog::find_by_id(&state.devices, &id),
        (None, Some(name)) => catalog::find_by_name(&state.devices, &name),
    };

    let Some(device) = device else {
        return Json(json!({ "success": false, "error": "未找到匹配的设备" }));
    };

    Json(json!({
        "success": true,
        "data": {
            "device_id": device.device_id,
            "device_name": device.name,
            "rtsp_url": device.rtsp_url,
            "http_url": device.http_url,
            "ip_address": device.ip_address,
            "port": device.port,
            "status": device.status,
            "hls_url": format!("{}/hls/{}/stream.m3u8", state.public_base, device.device_id),
            "webrtc_url": format!("{}/webrtc/{}", state.public_base, device.device_id),
        }
    }))
}

fn not_found() -> Value {
    json!({ "success": false, "error": NOT_FOUND })
}

// ─── Test support ────────────────────────────────────────────────────────────

/// Serve the mock router on an ephemeral loopback port for tests.
///
/// Returns the base URL; the server lives until the test runtime shuts down.
#[cfg(test)]
pub(crate) async fn spawn_for_tests() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let public_base = base.clone();
    tokio::spawn(async move {
        let _ = serve(listener, &public_base, std::future::pending()).await;
    });
    base
}

// ─── Tests ───────────────────────────────────────────────────────────────────
