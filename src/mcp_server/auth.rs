//! Request gate: shared-secret validation for inbound MCP requests.
//!
//! Transports normalize whatever metadata they see (HTTP headers, JSON-RPC
//! params, a `headers` object embedded in params) into one [`RequestContext`]
//! at the boundary. The gate only ever looks at that context.
//!
//! Sources are checked in a fixed order and the first match wins:
//! 1. `Authorization: Bearer <token>`
//! 2. `X-API-Key`
//! 3. `API-Key`
//! 4. `api_key` request parameter

use std::collections::HashMap;

use serde::Serialize;

// ─── RequestContext ──────────────────────────────────────────────────────────

/// Normalized request metadata: lower-cased headers plus flat string params.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HashMap<String, String>,
    params: HashMap<String, String>,
}

impl RequestContext {
    /// An empty context (stdio requests with no metadata).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` header pairs. Names are case-insensitive.
    pub fn from_headers<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut ctx = Self::new();
        for (name, value) in headers {
            ctx.insert_header(name.as_ref(), value.as_ref());
        }
        ctx
    }

    /// Add a header (builder style).
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.insert_header(name, value);
        self
    }

    /// Add a parameter (builder style).
    pub fn with_param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Merge metadata carried inside JSON-RPC `params`.
    ///
    /// Top-level string fields become parameters. A nested `headers` object
    /// (used by clients that cannot set transport headers, e.g. over stdio)
    /// contributes headers; transport headers already present win.
    pub fn merge_rpc_params(&mut self, params: Option<&serde_json::Value>) {
        let Some(obj) = params.and_then(|p| p.as_object()) else {
            return;
        };

        for (key, value) in obj {
            if key == "headers" {
                if let Some(headers) = value.as_object() {
                    for (name, v) in headers {
                        if let Some(s) = v.as_str() {
                            self.headers
                                .entry(name.to_ascii_lowercase())
                                .or_insert_with(|| s.to_string());
                        }
                    }
                }
                continue;
            }
            if let Some(s) = value.as_str() {
                self.params
                    .entry(key.clone())
                    .or_insert_with(|| s.to_string());
            }
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Parameter lookup.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    fn insert_header(&mut self, name: &str, value: &str) {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
    }
}

// ─── AuthDecision ────────────────────────────────────────────────────────────

/// Where a valid credential was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthSource {
    AuthorizationHeader,
    XApiKeyHeader,
    ApiKeyHeader,
    Params,
}

impl AuthSource {
    fn describe(self) -> &'static str {
        match self {
            AuthSource::AuthorizationHeader => "Authorization header",
            AuthSource::XApiKeyHeader => "X-API-Key header",
            AuthSource::ApiKeyHeader => "API-Key header",
            AuthSource::Params => "params",
        }
    }
}

/// Outcome of the gate. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthDecision {
    pub valid: bool,
    pub reason: String,
    /// Matched location, for audit logging.
    pub source: Option<AuthSource>,
}

impl AuthDecision {
    fn accepted(source: AuthSource) -> Self {
        Self {
            valid: true,
            reason: format!("API key validated successfully from {}", source.describe()),
            source: Some(source),
        }
    }

    fn rejected() -> Self {
        Self {
            valid: false,
            reason: "Missing or invalid API key. Please provide a valid API key in \
                     Authorization header (Bearer format), X-API-Key header, API-Key header, \
                     or params.api_key"
                .to_string(),
            source: None,
        }
    }

    /// Structured 401 payload returned to the caller instead of raising.
    pub fn unauthorized_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.reason,
            "status": "unauthorized",
            "code": 401,
        })
    }
}

// ─── Gate ────────────────────────────────────────────────────────────────────

/// Validate `ctx` against the shared `secret`.
pub fn validate(ctx: &RequestContext, secret: &str) -> AuthDecision {
    let secret = secret.trim();
    if secret.is_empty() {
        // An empty secret would otherwise match empty headers.
        return AuthDecision::rejected();
    }

    if let Some(auth) = ctx.header("authorization") {
        if let Some(token) = auth.trim().strip_prefix("Bearer ") {
            if token.split_whitespace().next() == Some(secret) {
                return AuthDecision::accepted(AuthSource::AuthorizationHeader);
            }
        }
    }

    let candidates = [
        (ctx.header("x-api-key"), AuthSource::XApiKeyHeader),
        (ctx.header("api-key"), AuthSource::ApiKeyHeader),
        (ctx.param("api_key"), AuthSource::Params),
    ];

    for (value, source) in candidates {
        if value.map(str::trim) == Some(secret) {
            return AuthDecision::accepted(source);
        }
    }

    AuthDecision::rejected()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
