//! MCP server error types.

use thiserror::Error;

use super::types::{error_codes, JsonRpcError};

/// Errors raised while handling an inbound JSON-RPC message.
///
/// Every variant maps onto a JSON-RPC error code; see [`McpError::to_rpc_error`].
#[derive(Debug, Error)]
pub enum McpError {
    /// The message was not valid JSON.
    #[error("parse error: {reason}")]
    ParseError { reason: String },

    /// The JSON was valid but not a JSON-RPC request.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// No handler for the method.
    #[error("method not found: '{method}'")]
    MethodNotFound { method: String },

    /// Method parameters failed to deserialize.
    #[error("invalid params for '{method}': {reason}")]
    InvalidParams { method: String, reason: String },

    /// Tool not found in the registry.
    #[error("unknown tool: '{name}'")]
    UnknownTool { name: String },

    /// Anything else that went wrong while producing a response.
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl McpError {
    /// The JSON-RPC error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            McpError::ParseError { .. } => error_codes::PARSE_ERROR,
            McpError::InvalidRequest { .. } => error_codes::INVALID_REQUEST,
            McpError::MethodNotFound { .. } => error_codes::METHOD_NOT_FOUND,
            McpError::InvalidParams { .. } | McpError::UnknownTool { .. } => {
                error_codes::INVALID_PARAMS
            }
            McpError::Internal { .. } => error_codes::INTERNAL_ERROR,
        }
    }

    /// Convert into the wire error object.
    pub fn to_rpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(e: serde_json::Error) -> Self {
        McpError::Internal {
            reason: e.to_string(),
        }
    }
}
