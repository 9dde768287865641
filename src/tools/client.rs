//! HTTP client for the video data service.
//!
//! Thin wrapper over `reqwest`: builds URLs against the configured base,
//! applies the request timeout, and maps every failure onto a labeled
//! [`ToolError`]. Paths are given as segments; each one is percent-encoded,
//! so a caller-supplied device id can never reach a different endpoint.

use std::time::Duration;

use reqwest::{Client as HttpClient, Url};

use super::errors::ToolError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── VideoApiClient ──────────────────────────────────────────────────────────

/// Client for the video data service REST API.
#[derive(Debug, Clone)]
pub struct VideoApiClient {
    http: HttpClient,
    base_url: Url,
    /// Forwarded as `X-Request-Id` when the inbound request carried one.
    request_id: Option<String>,
}

/// Header used to correlate tool calls with backend requests.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

impl VideoApiClient {
    /// Create a client for `base_url` with a per-request `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ToolError> {
        let base = Url::parse(base_url.trim()).map_err(|e| ToolError::ClientBuild {
            reason: format!("invalid base URL '{base_url}': {e}"),
        })?;
        if base.cannot_be_a_base() {
            return Err(ToolError::ClientBuild {
                reason: format!("invalid base URL '{base_url}': not a hierarchical URL"),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: base,
            request_id: None,
        })
    }

    /// A client sharing this one's connection pool that tags every request
    /// with `request_id`.
    pub fn with_request_id(&self, request_id: Option<&str>) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            request_id: request_id.map(str::to_string),
        }
    }

    /// The configured base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// `GET {base}/{segments}?{query}` and decode the JSON body.
    pub async fn get_json(
        &self,
        tool: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, ToolError> {
        let request = self.http.get(self.url(segments)).query(query);
        self.send(tool, request).await
    }

    /// `POST {base}/{segments}?{query}` (empty body) and decode the JSON body.
    pub async fn post_json(
        &self,
        tool: &str,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, ToolError> {
        let request = self.http.post(self.url(segments)).query(query);
        self.send(tool, request).await
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked hierarchical in `new`.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        tool: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ToolError> {
        let request = match &self.request_id {
            Some(id) => request.header(REQUEST_ID_HEADER, id),
            None => request,
        };
        let response = request.send().await.map_err(|e| ToolError::Transport {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(tool, status = status.as_u16(), "video service returned error status");
            return Err(ToolError::HttpStatus {
                tool: tool.to_string(),
                status: status.as_u16(),
            });
        }

        response.json().await.map_err(|e| ToolError::Decode {
            tool: tool.to_string(),
            reason: e.to_string(),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = VideoApiClient::new("http://localhost:8001/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8001");
        assert_eq!(client.url(&["api", "devices"]).as_str(), "http://localhost:8001/api/devices");
    }

    #[test]
    fn test_url_segments_are_percent_encoded() {
        let client = VideoApiClient::new("http://localhost:8001/video/", Duration::from_secs(1)).unwrap();
        let url = client.url(&["api", "devices", "ca001/playback?x=1"]);
        assert_eq!(url.as_str(), "http://localhost:8001/video/api/devices/ca001%2Fplayback%3Fx=1");
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let err = VideoApiClient::new("not a url", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ToolError::ClientBuild { .. }));
        assert!(VideoApiClient::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn test_with_request_id_keeps_base() {
        let client = VideoApiClient::new("http://localhost:8001", Duration::from_secs(1)).unwrap();
        let tagged = client.with_request_id(Some("req-1"));
        assert_eq!(tagged.base_url(), client.base_url());
        assert_eq!(tagged.request_id.as_deref(), Some("req-1"));
        assert!(client.request_id.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client =
            VideoApiClient::new(&format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).unwrap();
        let err = client.get_json("get_video_devices", &["api", "devices"], &[]).await.unwrap_err();
        assert!(matches!(err, ToolError::Transport { .. }));
        assert!(err.to_string().starts_with("get_video_devices: request to video service failed"));
    }
}
