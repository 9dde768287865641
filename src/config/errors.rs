//! Configuration error types.

use thiserror::Error;

/// Errors raised while building a [`super::ServiceConfig`] or loading [`super::Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The protocol name is not one of `stdio`, `http`, `sse`.
    #[error("unknown protocol '{value}' (expected stdio, http or sse)")]
    UnknownProtocol { value: String },

    /// A port-based protocol was configured without a port.
    #[error("protocol '{protocol}' requires a port")]
    MissingPort { protocol: String },

    /// A port value could not be parsed or is out of range.
    #[error("invalid port '{value}': {reason}")]
    InvalidPort { value: String, reason: String },

    /// The auth scope name is not recognized.
    #[error("unknown auth scope '{value}' (expected discovery or all)")]
    UnknownAuthScope { value: String },

    /// The settings file exists but could not be read or parsed.
    #[error("settings file '{path}': {reason}")]
    SettingsFile { path: String, reason: String },
}
