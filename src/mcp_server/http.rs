//! HTTP transports: streamable HTTP (`POST /mcp`) and SSE
//! (`GET /sse` + `POST /messages?session_id=`).
//!
//! A listener serves exactly one of them. Both build a [`RequestContext`] from the request headers and hand the
//! body to the shared [`McpServer`].

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::auth::RequestContext;
use super::dispatch::McpServer;
use super::types::JsonRpcResponse;

/// Header carrying the streamable-HTTP session id.
pub const SESSION_HEADER: &str = "mcp-session-id";

// ─── State ───────────────────────────────────────────────────────────────────

type SessionMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<JsonRpcResponse>>>>;

#[derive(Clone)]
struct HttpState {
    server: Arc<McpServer>,
    sessions: SessionMap,
    cancel: CancellationToken,
}

/// Removes an SSE session from the map when its stream is dropped.
struct SessionGuard {
    sessions: SessionMap,
    id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(&self.id);
        tracing::debug!(session_id = %self.id, remaining = sessions.len(), "SSE session closed");
    }
}

#[derive(Debug, Deserialize)]
struct SessionQuery {
    session_id: String,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Which HTTP transport a listener speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpTransport {
    /// `POST /mcp`.
    Streamable,
    /// `GET /sse` plus `POST /messages`.
    Sse,
}

/// Build the router for one transport. Cancelling `cancel` ends every open
/// SSE stream so graceful shutdown can complete.
pub fn router(server: Arc<McpServer>, transport: HttpTransport, cancel: CancellationToken) -> Router {
    let state = HttpState {
        server,
        sessions: Arc::new(Mutex::new(HashMap::new())),
        cancel,
    };

    let routes = match transport {
        HttpTransport::Streamable => Router::new().route("/mcp", post(post_mcp)),
        HttpTransport::Sse => Router::new()
            .route("/sse", get(open_sse))
            .route("/messages", post(post_message)),
    };
    routes.with_state(state)
}

/// Serve `transport` on a bound listener until `cancel` fires.
pub async fn serve(
    listener: tokio::net::TcpListener,
    server: Arc<McpServer>,
    transport: HttpTransport,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let shutdown = cancel.clone();
    axum::serve(listener, router(server, transport, cancel))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

fn context_from_headers(headers: &HeaderMap) -> RequestContext {
    RequestContext::from_headers(
        headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v))),
    )
}

// ─── Streamable HTTP ─────────────────────────────────────────────────────────

async fn post_mcp(State(state): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    let ctx = context_from_headers(&headers);
    let is_initialize = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("method").and_then(|m| m.as_str()).map(|m| m == "initialize"))
        .unwrap_or(false);

    let Some(response) = state.server.handle_message(&body, &ctx).await else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut http_response = Json(response).into_response();
    if is_initialize {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(session_id = %session_id, "HTTP session initialized");
        if let Ok(value) = HeaderValue::from_str(&session_id) {
            http_response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    http_response
}

// ─── SSE ─────────────────────────────────────────────────────────────────────

async fn open_sse(State(state): State<HttpState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::unbounded_channel::<JsonRpcResponse>();
    state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(session_id.clone(), tx);
    tracing::info!(session_id = %session_id, "SSE session opened");

    let endpoint = Event::default()
        .event("endpoint")
        .data(format!("/messages?session_id={session_id}"));

    let guard = SessionGuard {
        sessions: state.sessions.clone(),
        id: session_id,
    };

    let messages = stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let response = rx.recv().await?;
        let event = match serde_json::to_string(&response) {
            Ok(json) => Event::default().event("message").data(json),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize SSE message");
                Event::default().comment("serialization failed")
            }
        };
        Some((Ok::<_, Infallible>(event), (rx, guard)))
    });

    let cancel = state.cancel.clone();
    let stream = stream::once(async move { Ok::<_, Infallible>(endpoint) })
        .chain(messages)
        .take_until(async move { cancel.cancelled().await });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn post_message(
    State(state): State<HttpState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: String,
) -> StatusCode {
    let sender = state
        .sessions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&query.session_id)
        .cloned();

    let Some(sender) = sender else {
        tracing::warn!(session_id = %query.session_id, "message for unknown SSE session");
        return StatusCode::NOT_FOUND;
    };

    let ctx = context_from_headers(&headers);
    if let Some(response) = state.server.handle_message(&body, &ctx).await {
        if sender.send(response).is_err() {
            tracing::warn!(session_id = %query.session_id, "SSE stream closed before response");
        }
    }
    StatusCode::ACCEPTED
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::mcp_server::registry::ToolRegistry;

    async fn spawn(transport: HttpTransport) -> (String, CancellationToken) {
        let server = Arc::new(
            McpServer::new(ToolRegistry::with_video_tools(), Settings::default()).unwrap(),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let cancel = CancellationToken::new();
        tokio::spawn(serve(listener, server, transport, cancel.clone()));
        (base, cancel)
    }

    /// Read SSE chunks until the accumulated text contains `needle`.
    async fn read_until(response: &mut reqwest::Response, buffer: &mut String, needle: &str) {
        while !buffer.contains(needle) {
            let chunk = response.chunk().await.unwrap().expect("stream ended early");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    #[tokio::test]
    async fn test_streamable_http_session_and_notifications() {
        let (base, cancel) = spawn(HttpTransport::Streamable).await;
        let client = reqwest::Client::new();

        let init = client
            .post(format!("{base}/mcp"))
            .body(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(init.status(), 200);
        assert!(init.headers().contains_key(SESSION_HEADER));

        let note = client
            .post(format!("{base}/mcp"))
            .body(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(note.status(), 202);

        let list: serde_json::Value = client
            .post(format!("{base}/mcp"))
            .header("Authorization", format!("Bearer {}", Settings::default().api_key))
            .body(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(list["result"]["tools"].as_array().unwrap().len(), 5);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_sse_endpoint_and_message_delivery() {
        let (base, cancel) = spawn(HttpTransport::Sse).await;
        let client = reqwest::Client::new();

        let mut stream = client.get(format!("{base}/sse")).send().await.unwrap();
        assert_eq!(stream.status(), 200);

        let mut buffer = String::new();
        read_until(&mut stream, &mut buffer, "/messages?session_id=").await;
        read_until(&mut stream, &mut buffer, "\n\n").await;
        assert!(buffer.contains("event: endpoint"));
        let path = buffer
            .lines()
            .find_map(|l| l.strip_prefix("data: "))
            .unwrap()
            .trim()
            .to_string();

        let posted = client
            .post(format!("{base}{path}"))
            .body(r#"{"jsonrpc":"2.0","id":"p1","method":"ping"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(posted.status(), 202);

        read_until(&mut stream, &mut buffer, "\"id\":\"p1\"").await;
        assert!(buffer.contains("event: message"));

        let unknown = client
            .post(format!("{base}/messages?session_id=does-not-exist"))
            .body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(unknown.status(), 404);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_each_transport_serves_only_its_routes() {
        let client = reqwest::Client::new();
        let body = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;

        let (base, cancel) = spawn(HttpTransport::Streamable).await;
        let sse = client.get(format!("{base}/sse")).send().await.unwrap();
        assert_eq!(sse.status(), 404);
        let messages = client
            .post(format!("{base}/messages?session_id=x"))
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(messages.status(), 404);
        cancel.cancel();

        let (base, cancel) = spawn(HttpTransport::Sse).await;
        let mcp = client.post(format!("{base}/mcp")).body(body).send().await.unwrap();
        assert_eq!(mcp.status(), 404);
        cancel.cancel();
    }
}
