//! Structured CLI responses and their message templates.

use serde::Serialize;
use serde_json::Value;

use crate::config::Protocol;

// ─── Messages ────────────────────────────────────────────────────────────────

/// User-facing message templates.
pub mod messages {
    pub fn started(port: Option<u16>) -> String {
        match port {
            Some(port) => format!("video_server MCP server started successfully on port {port}"),
            None => "video_server MCP server started successfully".to_string(),
        }
    }

    pub const START_FAILED: &str = "Failed to start video_server MCP server";
    pub const STOPPED: &str = "Server stopped successfully";
    pub const STOP_FAILED: &str = "Server failed to stop";
    pub const RUNNING: &str = "video_server MCP server is running";
    pub const NOT_RUNNING: &str = "video_server MCP server is not running";
    pub const PING_OK: &str = "Server is responding";
    pub const PING_FAILED: &str = "Server is not responding";
    pub const INTERRUPTED: &str = "Operation cancelled by user";

    pub fn version(version: &str) -> String {
        format!("video_server MCP Server v{version}")
    }

    pub fn error(error: impl std::fmt::Display) -> String {
        format!("Error: {error}")
    }
}

// ─── CliResponse ─────────────────────────────────────────────────────────────

/// One command's outcome, rendered as JSON or as its message line.
#[derive(Debug, Clone, Serialize)]
pub struct CliResponse {
    pub success: bool,
    pub message: String,
    /// Unix seconds.
    pub timestamp: i64,
    pub protocol: Protocol,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CliResponse {
    /// Build a response. The port is dropped for stdio.
    pub fn new(success: bool, message: impl Into<String>, protocol: Protocol, port: Option<u16>) -> Self {
        Self {
            success,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp(),
            protocol,
            port: port.filter(|_| protocol.uses_port()),
            data: None,
        }
    }

    /// Attach a data payload; empty objects and nulls are omitted.
    pub fn with_data(mut self, data: Value) -> Self {
        let empty = match &data {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        self.data = if empty { None } else { Some(data) };
        self
    }

    pub fn exit_code(&self) -> u8 {
        if self.success {
            0
        } else {
            1
        }
    }

    /// Render as a single JSON line or the bare message.
    pub fn render(&self, json: bool) -> String {
        if json {
            serde_json::to_string(self).unwrap_or_else(|e| {
                // Hand-built fallback so JSON mode always emits an object.
                serde_json::json!({
                    "success": false,
                    "message": messages::error(e),
                    "timestamp": self.timestamp,
                    "protocol": self.protocol.as_str(),
                })
                .to_string()
            })
        } else {
            self.message.clone()
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_started_message_variants() {
        assert_eq!(
            messages::started(Some(5005)),
            "video_server MCP server started successfully on port 5005"
        );
        assert_eq!(messages::started(None), "video_server MCP server started successfully");
        assert_eq!(messages::version("1.0.0"), "video_server MCP Server v1.0.0");
        assert_eq!(messages::error("boom"), "Error: boom");
    }

    #[test]
    fn test_json_shape_for_port_protocol() {
        let resp = CliResponse::new(true, messages::RUNNING, Protocol::Http, Some(5005))
            .with_data(json!({"status": "running", "port": 5005, "protocol": "http"}));
        let value: Value = serde_json::from_str(&resp.render(true)).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["protocol"], "http");
        assert_eq!(value["port"], 5005);
        assert_eq!(value["data"]["status"], "running");
        assert!(value["timestamp"].as_i64().unwrap() > 0);
        assert_eq!(resp.exit_code(), 0);
    }

    #[test]
    fn test_stdio_omits_port_and_empty_data() {
        let resp = CliResponse::new(false, messages::STOP_FAILED, Protocol::Stdio, Some(5005))
            .with_data(json!({}));
        let value: Value = serde_json::from_str(&resp.render(true)).unwrap();
        assert!(value.get("port").is_none());
        assert!(value.get("data").is_none());
        assert_eq!(resp.exit_code(), 1);
    }

    #[test]
    fn test_text_mode_is_message_line() {
        let resp = CliResponse::new(true, messages::STOPPED, Protocol::Sse, Some(5005));
        assert_eq!(resp.render(false), "Server stopped successfully");
    }
}
