//! JSON-RPC dispatch for the MCP methods this server implements.
//!
//! Transports hand every inbound message to [`McpServer::handle_message`]
//! together with the [`RequestContext`] they built from their own metadata.
//! `None` means "send nothing back" (notifications).

use serde_json::{json, Value};

use super::auth::{self, RequestContext};
use super::errors::McpError;
use super::registry::ToolRegistry;
use super::types::{
    JsonRpcRequest, JsonRpcResponse, ToolCallParams, ToolCallResult, DEFAULT_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::config::Settings;
use crate::tools::{ToolError, VideoApiClient};

// ─── McpServer ───────────────────────────────────────────────────────────────

/// The MCP request handler shared by every transport.
#[derive(Debug)]
pub struct McpServer {
    registry: ToolRegistry,
    client: VideoApiClient,
    settings: Settings,
}

impl McpServer {
    /// Build a server over a populated registry.
    pub fn new(registry: ToolRegistry, settings: Settings) -> Result<Self, ToolError> {
        let client = VideoApiClient::new(&settings.api_base_url, settings.request_timeout)?;
        tracing::info!(
            tools = registry.len(),
            api_base_url = %client.base_url(),
            auth_scope = %settings.auth_scope,
            "MCP server handler ready"
        );
        Ok(Self {
            registry,
            client,
            settings,
        })
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle one raw message (a single JSON-RPC object).
    pub async fn handle_message(&self, raw: &str, ctx: &RequestContext) -> Option<JsonRpcResponse> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                let err = McpError::ParseError {
                    reason: e.to_string(),
                };
                tracing::warn!(error = %err, "rejected malformed message");
                return Some(JsonRpcResponse::failure(Value::Null, err.to_rpc_error()));
            }
        };

        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request, ctx).await,
            Err(e) => {
                let err = McpError::InvalidRequest {
                    reason: e.to_string(),
                };
                // Without an id there is no one to answer.
                id.map(|id| JsonRpcResponse::failure(id, err.to_rpc_error()))
            }
        }
    }

    /// Handle one parsed request.
    pub async fn handle(&self, request: JsonRpcRequest, ctx: &RequestContext) -> Option<JsonRpcResponse> {
        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        let mut ctx = ctx.clone();
        ctx.merge_rpc_params(request.params.as_ref());

        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.initialize(request.params.as_ref())),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools(&ctx)),
            "tools/call" => self.call_tool(request.params, &ctx).await,
            other => Err(McpError::MethodNotFound {
                method: other.to_string(),
            }),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                tracing::debug!(method = %request.method, error = %err, "request failed");
                JsonRpcResponse::failure(id, err.to_rpc_error())
            }
        })
    }

    fn initialize(&self, params: Option<&Value>) -> Value {
        let protocol_version = params
            .and_then(|p| p.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PROTOCOL_VERSION);

        json!({
            "protocolVersion": protocol_version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn list_tools(&self, ctx: &RequestContext) -> Value {
        if let Err(payload) = self.gate(ctx) {
            return payload;
        }
        json!({ "tools": self.registry.definitions() })
    }

    async fn call_tool(&self, params: Option<Value>, ctx: &RequestContext) -> Result<Value, McpError> {
        let params: ToolCallParams = serde_json::from_value(params.unwrap_or(Value::Null))
            .map_err(|e| McpError::InvalidParams {
                method: "tools/call".into(),
                reason: e.to_string(),
            })?;

        if self.settings.auth_scope.gates_calls() {
            if let Err(payload) = self.gate(ctx) {
                return Ok(payload);
            }
        }

        let tool = self.registry.get(&params.name).ok_or_else(|| McpError::UnknownTool {
            name: params.name.clone(),
        })?;

        tracing::info!(tool = %params.name, "tool call");
        let result = match tool.invoke(&self.client, params.arguments, Some(ctx)).await {
            Ok(value) => ToolCallResult::from_value(value),
            Err(e) => {
                tracing::warn!(tool = %params.name, error = %e, "tool call failed");
                ToolCallResult::from_error(e.to_string())
            }
        };

        Ok(serde_json::to_value(result)?)
    }

    /// Run the request gate; `Err` carries the 401 payload to return.
    fn gate(&self, ctx: &RequestContext) -> Result<(), Value> {
        let decision = auth::validate(ctx, &self.settings.api_key);
        if decision.valid {
            tracing::debug!(reason = %decision.reason, "request authorized");
            Ok(())
        } else {
            tracing::warn!("request rejected by API key gate");
            Err(decision.unauthorized_payload())
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthScope;
    use crate::mcp_server::types::error_codes;

    const KEY: &str = "test-key";

    fn server(base_url: &str, scope: AuthScope) -> McpServer {
        let settings = Settings {
            api_key: KEY.into(),
            api_base_url: base_url.into(),
            auth_scope: scope,
            ..Settings::default()
        };
        McpServer::new(ToolRegistry::with_video_tools(), settings).unwrap()
    }

    fn authed() -> RequestContext {
        RequestContext::new().with_header("X-API-Key", KEY)
    }

    async fn call(server: &McpServer, raw: &str, ctx: &RequestContext) -> Value {
        let resp = server.handle_message(raw, ctx).await.unwrap();
        serde_json::to_value(resp).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_echoes_protocol_version() {
        let server = server("http://127.0.0.1:9", AuthScope::Discovery);
        let resp = call(
            &server,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2025-03-26"}}"#,
            &RequestContext::new(),
        )
        .await;
        assert_eq!(resp["result"]["protocolVersion"], "2025-03-26");
        assert_eq!(resp["result"]["serverInfo"]["name"], "video_server");
        assert_eq!(resp["result"]["capabilities"]["tools"]["listChanged"], false);

        let resp = call(&server, r#"{"jsonrpc":"2.0","id":2,"method":"initialize"}"#, &RequestContext::new()).await;
        assert_eq!(resp["result"]["protocolVersion"], DEFAULT_PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn test_tools_list_requires_key() {
        let server = server("http://127.0.0.1:9", AuthScope::Discovery);
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;

        let denied = call(&server, raw, &RequestContext::new()).await;
        assert_eq!(denied["result"]["status"], "unauthorized");
        assert_eq!(denied["result"]["code"], 401);
        assert!(denied.get("error").is_none());

        let allowed = call(&server, raw, &authed()).await;
        assert_eq!(allowed["result"]["tools"].as_array().unwrap().len(), 5);
        assert!(allowed["result"]["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_key_in_params() {
        let server = server("http://127.0.0.1:9", AuthScope::Discovery);
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{"api_key":"test-key"}}"#;
        let resp = call(&server, raw, &RequestContext::new()).await;
        assert!(resp["result"]["tools"].is_array());
    }

    #[tokio::test]
    async fn test_tools_call_against_mock_service() {
        let base = crate::mock_service::spawn_for_tests().await;
        let server = server(&base, AuthScope::Discovery);
        let raw = r#"{"jsonrpc":"2.0","id":"c1","method":"tools/call","params":{"name":"get_device_details","arguments":{"device_id":"ca001"}}}"#;

        // Discovery scope leaves calls ungated.
        let resp = call(&server, raw, &RequestContext::new()).await;
        assert_eq!(resp["id"], "c1");
        assert_eq!(resp["result"]["isError"], false);
        assert_eq!(resp["result"]["structuredContent"]["device_id"], "ca001");
    }

    #[tokio::test]
    async fn test_tools_call_gated_with_scope_all() {
        let server = server("http://127.0.0.1:9", AuthScope::All);
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_video_devices"}}"#;
        let resp = call(&server, raw, &RequestContext::new()).await;
        assert_eq!(resp["result"]["code"], 401);
    }

    #[tokio::test]
    async fn test_tool_failure_is_error_result() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let server = server(&format!("http://127.0.0.1:{port}"), AuthScope::Discovery);
        let raw = r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"get_video_devices","arguments":{}}}"#;
        let resp = call(&server, raw, &RequestContext::new()).await;
        assert_eq!(resp["result"]["isError"], true);
        assert!(resp["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("request to video service failed"));
    }

    #[tokio::test]
    async fn test_error_codes() {
        let server = server("http://127.0.0.1:9", AuthScope::Discovery);
        let ctx = RequestContext::new();

        let unknown = call(&server, r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#, &ctx).await;
        assert_eq!(unknown["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let malformed = call(&server, "{not json", &ctx).await;
        assert_eq!(malformed["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(malformed["id"], Value::Null);

        let bad_params = call(&server, r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{}}"#, &ctx).await;
        assert_eq!(bad_params["error"]["code"], error_codes::INVALID_PARAMS);

        let unknown_tool = call(
            &server,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope"}}"#,
            &ctx,
        )
        .await;
        assert_eq!(unknown_tool["error"]["code"], error_codes::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let server = server("http://127.0.0.1:9", AuthScope::Discovery);
        let resp = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, &RequestContext::new())
            .await;
        assert!(resp.is_none());
    }
}
