//! Service configuration.
//!
//! Two layers:
//! - [`ServiceConfig`]: the transport protocol and port a supervisor serves on.
//!   Validated once at construction and immutable afterwards.
//! - [`Settings`]: ambient settings (shared secret, backend URL, timeouts),
//!   resolved from defaults → optional YAML file → environment.

pub mod errors;
pub mod settings;
pub mod types;

pub use errors::ConfigError;
pub use settings::{AuthScope, Settings};
pub use types::{Protocol, ServiceConfig};

/// Environment variable holding the primary service port.
pub const PORT_ENV: &str = "MCP_VIDEO_SERVER_PORT";

/// Environment variable holding the transport protocol.
pub const PROTOCOL_ENV: &str = "MCP_VIDEO_SERVER_PROTOCOL";

/// Environment variable holding the shared API secret.
pub const API_KEY_ENV: &str = "MCP_VIDEO_SERVER_API_KEY";

/// Environment variable holding the video data service base URL.
pub const API_BASE_URL_ENV: &str = "MCP_VIDEO_API_BASE_URL";

/// Environment variable selecting which requests the gate validates.
pub const AUTH_SCOPE_ENV: &str = "MCP_VIDEO_SERVER_AUTH_SCOPE";

/// Environment variable pointing at an optional YAML settings file.
pub const CONFIG_FILE_ENV: &str = "MCP_VIDEO_SERVER_CONFIG";

/// Default primary port when neither flag nor environment sets one.
pub const DEFAULT_PORT: u16 = 5005;
