//! The five video tools.
//!
//! Each tool deserializes its typed parameter set from the `tools/call`
//! arguments, forwards one request to the video data service, and reshapes
//! the JSON. "Not found" style answers are returned as `{error}` objects
//! where callers are expected to branch on them; hard failures are
//! [`ToolError`]s.

use serde::Deserialize;
use serde_json::{json, Value};

use super::client::{VideoApiClient, REQUEST_ID_HEADER};
use super::errors::ToolError;
use crate::mcp_server::RequestContext;

/// UTC timestamp format used in tool results.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// ─── Tool catalog ────────────────────────────────────────────────────────────

/// Every tool this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoTool {
    GetVideoDevices,
    GetDeviceDetails,
    StartLivePreview,
    PlaybackRecording,
    GetStreamUrl,
}

impl VideoTool {
    /// All tools, in registration order.
    pub const ALL: [VideoTool; 5] = [
        VideoTool::GetVideoDevices,
        VideoTool::GetDeviceDetails,
        VideoTool::StartLivePreview,
        VideoTool::PlaybackRecording,
        VideoTool::GetStreamUrl,
    ];

    pub fn name(self) -> &'static str {
        match self {
            VideoTool::GetVideoDevices => "get_video_devices",
            VideoTool::GetDeviceDetails => "get_device_details",
            VideoTool::StartLivePreview => "start_live_preview",
            VideoTool::PlaybackRecording => "playback_recording",
            VideoTool::GetStreamUrl => "get_stream_url",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            VideoTool::GetVideoDevices => {
                "List video devices, optionally filtered by type, status, or keyword."
            }
            VideoTool::GetDeviceDetails => "Get the full record of one video device.",
            VideoTool::StartLivePreview => {
                "Start a live preview of a device and return its RTSP and HTTP stream URLs."
            }
            VideoTool::PlaybackRecording => {
                "Play back a device's recording between two ISO-8601 timestamps."
            }
            VideoTool::GetStreamUrl => "Get a device's stream URL for the given protocol (rtsp or http).",
        }
    }

    /// JSON Schema of the tool's arguments.
    pub fn input_schema(self) -> Value {
        let stream_type = json!({
            "type": "string",
            "enum": ["main", "sub"],
            "default": "main",
            "description": "Stream type"
        });
        let device_id = json!({ "type": "string", "description": "Device ID" });

        match self {
            VideoTool::GetVideoDevices => json!({
                "type": "object",
                "properties": {
                    "device_type": { "type": "string", "description": "Device type filter (ip_camera, nvr)" },
                    "status": { "type": "string", "description": "Device status filter (online, offline)" },
                    "keyword": { "type": "string", "description": "Keyword matched against name, id, and location" }
                }
            }),
            VideoTool::GetDeviceDetails => json!({
                "type": "object",
                "properties": { "device_id": device_id },
                "required": ["device_id"]
            }),
            VideoTool::StartLivePreview => json!({
                "type": "object",
                "properties": { "device_id": device_id, "stream_type": stream_type },
                "required": ["device_id"]
            }),
            VideoTool::PlaybackRecording => json!({
                "type": "object",
                "properties": {
                    "device_id": device_id,
                    "start_time": { "type": "string", "description": "Start time (ISO-8601)" },
                    "end_time": { "type": "string", "description": "End time (ISO-8601)" },
                    "stream_type": stream_type
                },
                "required": ["device_id", "start_time", "end_time"]
            }),
            VideoTool::GetStreamUrl => json!({
                "type": "object",
                "properties": {
                    "device_id": device_id,
                    "protocol": { "type": "string", "enum": ["rtsp", "http"], "default": "rtsp" },
                    "stream_type": stream_type
                },
                "required": ["device_id"]
            }),
        }
    }

    /// Deserialize `arguments` into this tool's parameters and run it.
    ///
    /// `ctx` is the caller's request metadata, if any; its `X-Request-Id`
    /// is forwarded to the data service.
    pub async fn invoke(
        self,
        client: &VideoApiClient,
        arguments: Value,
        ctx: Option<&RequestContext>,
    ) -> Result<Value, ToolError> {
        // A missing `arguments` field arrives as null; treat it as `{}`.
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        let tagged = ctx
            .and_then(|c| c.header(REQUEST_ID_HEADER))
            .map(|id| client.with_request_id(Some(id)));
        let client = tagged.as_ref().unwrap_or(client);

        match self {
            VideoTool::GetVideoDevices => get_video_devices(client, self.parse(arguments)?).await,
            VideoTool::GetDeviceDetails => get_device_details(client, self.parse(arguments)?).await,
            VideoTool::StartLivePreview => start_live_preview(client, self.parse(arguments)?).await,
            VideoTool::PlaybackRecording => playback_recording(client, self.parse(arguments)?).await,
            VideoTool::GetStreamUrl => get_stream_url(client, self.parse(arguments)?).await,
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(self, arguments: Value) -> Result<T, ToolError> {
        serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments {
            tool: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

// ─── Parameter sets ──────────────────────────────────────────────────────────

/// Arguments of `get_video_devices`.
#[derive(Debug, Default, Deserialize)]
pub struct ListDevicesParams {
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub keyword: Option<String>,
}

/// Arguments of `get_device_details`.
#[derive(Debug, Deserialize)]
pub struct DeviceParams {
    pub device_id: String,
}

/// Arguments of `start_live_preview`.
#[derive(Debug, Deserialize)]
pub struct LivePreviewParams {
    pub device_id: String,
    #[serde(default = "default_stream_type")]
    pub stream_type: String,
}

/// Arguments of `playback_recording`.
#[derive(Debug, Deserialize)]
pub struct PlaybackParams {
    pub device_id: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_stream_type")]
    pub stream_type: String,
}

/// Arguments of `get_stream_url`.
#[derive(Debug, Deserialize)]
pub struct StreamUrlParams {
    pub device_id: String,
    #[serde(default = "default_stream_protocol")]
    pub protocol: String,
    #[serde(default = "default_stream_type")]
    pub stream_type: String,
}

fn default_stream_type() -> String {
    "main".to_string()
}

fn default_stream_protocol() -> String {
    "rtsp".to_string()
}

// ─── Tools ───────────────────────────────────────────────────────────────────

/// List devices. Backend `success: false` is a hard error.
pub async fn get_video_devices(
    client: &VideoApiClient,
    params: ListDevicesParams,
) -> Result<Value, ToolError> {
    let tool = VideoTool::GetVideoDevices.name();

    let mut query = Vec::new();
    for (key, value) in [
        ("type", params.device_type),
        ("status", params.status),
        ("keyword", params.keyword),
    ] {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            query.push((key, v));
        }
    }

    let result = client.get_json(tool, &["api", "devices"], &query).await?;
    ensure_success(tool, &result)?;

    Ok(json!({
        "devices": result.get("data").cloned().unwrap_or_else(|| json!([])),
        "total": result.get("total").cloned().unwrap_or_else(|| json!(0)),
    }))
}

/// Fetch one device. Unknown ids come back as `{error}`.
pub async fn get_device_details(
    client: &VideoApiClient,
    params: DeviceParams,
) -> Result<Value, ToolError> {
    let tool = VideoTool::GetDeviceDetails.name();
    let result = client
        .get_json(tool, &["api", "devices", params.device_id.as_str()], &[])
        .await?;

    if is_success(&result) {
        Ok(result.get("data").cloned().unwrap_or_else(|| json!({})))
    } else {
        Ok(json!({ "error": backend_error(&result, "设备不存在") }))
    }
}

/// Start a live preview and report both stream URLs.
pub async fn start_live_preview(
    client: &VideoApiClient,
    params: LivePreviewParams,
) -> Result<Value, ToolError> {
    let tool = VideoTool::StartLivePreview.name();
    let path = ["api", "devices", params.device_id.as_str(), "live-view"];
    let result = client.post_json(tool, &path, &[]).await?;
    ensure_success(tool, &result)?;

    Ok(json!({
        "device_id": params.device_id,
        "stream_type": params.stream_type,
        "status": "success",
        "message": "Live preview started",
        "stream_urls": {
            "rtsp": str_field(&result, "rtsp_url"),
            "http": str_field(&result, "proxy_url"),
        },
        "start_time": now_utc(),
    }))
}

/// Start playback of a recorded interval.
pub async fn playback_recording(
    client: &VideoApiClient,
    params: PlaybackParams,
) -> Result<Value, ToolError> {
    let tool = VideoTool::PlaybackRecording.name();
    let path = ["api", "devices", params.device_id.as_str(), "playback"];
    let query = [
        ("start_time", params.start_time.clone()),
        ("end_time", params.end_time.clone()),
    ];
    let result = client.post_json(tool, &path, &query).await?;
    ensure_success(tool, &result)?;

    Ok(json!({
        "device_id": params.device_id,
        "stream_type": params.stream_type,
        "start_time": params.start_time,
        "end_time": params.end_time,
        "status": "success",
        "message": "Playback started",
        "playback_urls": {
            "http": str_field(&result, "playback_url"),
        },
    }))
}

/// Resolve a device's stream URL for `rtsp` or `http`.
pub async fn get_stream_url(
    client: &VideoApiClient,
    params: StreamUrlParams,
) -> Result<Value, ToolError> {
    let tool = VideoTool::GetStreamUrl.name();
    let query = [("device_id", params.device_id.clone())];
    let result = client.get_json(tool, &["api", "stream-url"], &query).await?;

    if !is_success(&result) {
        return Ok(json!({ "error": backend_error(&result, "未找到匹配的设备") }));
    }

    let data = result.get("data").cloned().unwrap_or_else(|| json!({}));
    let stream_url = match params.protocol.to_ascii_lowercase().as_str() {
        "rtsp" => str_field(&data, "rtsp_url"),
        "http" => str_field(&data, "http_url"),
        _ => return Ok(json!({ "error": "Unsupported protocol" })),
    };

    Ok(json!({
        "device_id": params.device_id,
        "protocol": params.protocol,
        "stream_type": params.stream_type,
        "stream_url": stream_url,
        "status": "success",
        "timestamp": now_utc(),
    }))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn is_success(result: &Value) -> bool {
    result.get("success").and_then(Value::as_bool).unwrap_or(false)
}

fn ensure_success(tool: &str, result: &Value) -> Result<(), ToolError> {
    if is_success(result) {
        Ok(())
    } else {
        Err(ToolError::Backend {
            tool: tool.to_string(),
            message: backend_error(result, "未知错误"),
        })
    }
}

fn backend_error(result: &Value, fallback: &str) -> String {
    result
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn now_utc() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock_service::spawn_for_tests;

    async fn client() -> VideoApiClient {
        let base = spawn_for_tests().await;
        VideoApiClient::new(&base, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_get_video_devices_filters() {
        let client = client().await;
        let all = VideoTool::GetVideoDevices
            .invoke(&client, Value::Null, None)
            .await
            .unwrap();
        assert_eq!(all["total"], 10);
        assert_eq!(all["devices"].as_array().unwrap().len(), 10);

        let offline = VideoTool::GetVideoDevices
            .invoke(&client, json!({"status": "offline"}), None)
            .await
            .unwrap();
        assert_eq!(offline["total"], 1);
        assert_eq!(offline["devices"][0]["device_id"], "ca003");
    }

    #[tokio::test]
    async fn test_get_device_details_found_and_missing() {
        let client = client().await;
        let found = VideoTool::GetDeviceDetails
            .invoke(&client, json!({"device_id": "nv001"}), None)
            .await
            .unwrap();
        assert_eq!(found["type"], "nvr");

        let missing = VideoTool::GetDeviceDetails
            .invoke(&client, json!({"device_id": "device_1"}), None)
            .await
            .unwrap();
        assert_eq!(missing["error"], "设备不存在");
    }

    #[tokio::test]
    async fn test_device_id_stays_one_path_segment() {
        let client = client().await;
        // Unescaped, this id would address the live-view endpoint of ca001.
        let details = VideoTool::GetDeviceDetails
            .invoke(&client, json!({"device_id": "ca001/live-view"}), None)
            .await
            .unwrap();
        assert_eq!(details["error"], "设备不存在");

        let err = VideoTool::StartLivePreview
            .invoke(&client, json!({"device_id": "../devices/ca001"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_start_live_preview_shape() {
        let client = client().await;
        let preview = VideoTool::StartLivePreview
            .invoke(&client, json!({"device_id": "ca001"}), None)
            .await
            .unwrap();
        assert_eq!(preview["stream_type"], "main");
        assert_eq!(preview["status"], "success");
        assert_eq!(preview["stream_urls"]["rtsp"], "rtsp://192.168.1.101:554/stream1");
        assert!(preview["stream_urls"]["http"].as_str().unwrap().ends_with("/rtsp/ca001"));
        assert!(preview["start_time"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_start_live_preview_unknown_device_is_error() {
        let client = client().await;
        let err = VideoTool::StartLivePreview
            .invoke(&client, json!({"device_id": "zz999"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Backend { .. }));
    }

    #[tokio::test]
    async fn test_playback_recording() {
        let client = client().await;
        let playback = VideoTool::PlaybackRecording
            .invoke(
                &client,
                json!({
                    "device_id": "ca002",
                    "start_time": "2023-01-01T00:00:00",
                    "end_time": "2023-01-01T01:00:00",
                    "stream_type": "sub"
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(playback["stream_type"], "sub");
        assert!(playback["playback_urls"]["http"]
            .as_str()
            .unwrap()
            .ends_with("/playback/ca002/2023-01-01T00:00:00/2023-01-01T01:00:00"));
    }

    #[tokio::test]
    async fn test_get_stream_url_protocols() {
        let client = client().await;
        let rtsp = VideoTool::GetStreamUrl
            .invoke(&client, json!({"device_id": "ca001"}), None)
            .await
            .unwrap();
        assert_eq!(rtsp["stream_url"], "rtsp://192.168.1.101:554/stream1");

        let http = VideoTool::GetStreamUrl
            .invoke(&client, json!({"device_id": "ca001", "protocol": "HTTP"}), None)
            .await
            .unwrap();
        assert_eq!(http["stream_url"], "http://192.168.1.101:80");

        let bad = VideoTool::GetStreamUrl
            .invoke(&client, json!({"device_id": "ca001", "protocol": "webrtc"}), None)
            .await
            .unwrap();
        assert_eq!(bad["error"], "Unsupported protocol");
    }

    #[tokio::test]
    async fn test_request_context_is_accepted() {
        let client = client().await;
        let ctx = RequestContext::new().with_header("X-Request-Id", "req-42");
        let devices = VideoTool::GetVideoDevices
            .invoke(&client, json!({"device_type": "nvr"}), Some(&ctx))
            .await
            .unwrap();
        assert_eq!(devices["total"], 2);
    }

    #[tokio::test]
    async fn test_missing_required_argument() {
        let client = client().await;
        let err = VideoTool::GetDeviceDetails
            .invoke(&client, json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        let schema = VideoTool::PlaybackRecording.input_schema();
        assert_eq!(schema["required"], json!(["device_id", "start_time", "end_time"]));
        assert!(VideoTool::GetVideoDevices.input_schema().get("required").is_none());
    }
}
