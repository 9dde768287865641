//! Embedded MCP service: JSON-RPC dispatch and its transports.
//!
//! Architecture:
//! - `types`: JSON-RPC 2.0 and MCP wire structures
//! - `errors`: JSON-RPC error taxonomy
//! - `auth`: request gate over a normalized request context
//! - `registry`: registered tools
//! - `dispatch`: method routing (`initialize`, `ping`, `tools/list`, `tools/call`)
//! - `stdio`: line-delimited transport
//! - `http`: streamable HTTP and SSE transports

pub mod auth;
pub mod dispatch;
pub mod errors;
pub mod http;
pub mod registry;
pub mod stdio;
pub mod types;

pub use auth::{validate, AuthDecision, AuthSource, RequestContext};
pub use dispatch::McpServer;
pub use errors::McpError;
pub use registry::ToolRegistry;
