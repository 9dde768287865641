//! Video tool error types.

use thiserror::Error;

/// Errors surfaced by the video tools.
///
/// Each variant names the failing tool so the single message that reaches the
/// MCP client identifies the call. Nothing here is retried.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The data service could not be reached (connect, timeout, I/O).
    #[error("{tool}: request to video service failed: {reason}")]
    Transport { tool: String, reason: String },

    /// The data service answered with a non-2xx status.
    #[error("{tool}: video service returned HTTP {status}")]
    HttpStatus { tool: String, status: u16 },

    /// The data service answered `success: false`.
    #[error("{tool}: API returned error: {message}")]
    Backend { tool: String, message: String },

    /// The response body was not the JSON we expected.
    #[error("{tool}: malformed response from video service: {reason}")]
    Decode { tool: String, reason: String },

    /// The tool arguments did not match the tool's parameter set.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild { reason: String },
}
