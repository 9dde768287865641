//! Video tools: thin wrappers that forward to the video data service.
//!
//! The MCP dispatcher owns the registry; this module only defines the tools
//! (name, description, input schema, behavior) and the HTTP client they share.

pub mod client;
pub mod errors;
pub mod video;

pub use client::VideoApiClient;
pub use errors::ToolError;
pub use video::VideoTool;
