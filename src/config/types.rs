//! Protocol and service configuration types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;
use super::{DEFAULT_PORT, PORT_ENV, PROTOCOL_ENV};

// ─── Protocol ────────────────────────────────────────────────────────────────

/// Transport the embedded MCP service speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Line-delimited JSON-RPC over the process's stdin/stdout.
    Stdio,
    /// Streamable HTTP: one JSON-RPC message per `POST /mcp`.
    Http,
    /// Server-sent events: `GET /sse` stream plus `POST /messages`.
    Sse,
}

impl Protocol {
    /// Whether this protocol binds a TCP port.
    pub fn uses_port(self) -> bool {
        !matches!(self, Protocol::Stdio)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Stdio => "stdio",
            Protocol::Http => "http",
            Protocol::Sse => "sse",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Protocol::Stdio),
            "http" => Ok(Protocol::Http),
            "sse" => Ok(Protocol::Sse),
            _ => Err(ConfigError::UnknownProtocol {
                value: s.to_string(),
            }),
        }
    }
}

// ─── ServiceConfig ───────────────────────────────────────────────────────────

/// Protocol and port of one supervised service instance.
///
/// Invariant: `protocol == Stdio` ⇔ `port == None`. The only way to build a
/// value is [`ServiceConfig::new`], which enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    port: Option<u16>,
    protocol: Protocol,
}

impl ServiceConfig {
    /// Build a config, enforcing the protocol/port invariant.
    ///
    /// A port passed alongside `stdio` is ignored rather than rejected, so a
    /// `--port` flag left over in a launcher script does not break stdio mode.
    pub fn new(protocol: Protocol, port: Option<u16>) -> Result<Self, ConfigError> {
        if !protocol.uses_port() {
            return Ok(Self {
                port: None,
                protocol,
            });
        }

        match port {
            None => Err(ConfigError::MissingPort {
                protocol: protocol.to_string(),
            }),
            Some(0) => Err(ConfigError::InvalidPort {
                value: "0".into(),
                reason: "port must be non-zero".into(),
            }),
            Some(p) => Ok(Self {
                port: Some(p),
                protocol,
            }),
        }
    }

    /// Resolve from CLI overrides, then the environment, then defaults.
    ///
    /// Precedence: explicit argument → `MCP_VIDEO_SERVER_*` variable →
    /// `http` on port 5005.
    pub fn resolve(
        protocol_override: Option<Protocol>,
        port_override: Option<u16>,
    ) -> Result<Self, ConfigError> {
        let protocol = match protocol_override {
            Some(p) => p,
            None => match std::env::var(PROTOCOL_ENV) {
                Ok(v) if !v.trim().is_empty() => v.parse()?,
                _ => Protocol::Http,
            },
        };

        let port = match port_override {
            Some(p) => p,
            None => match std::env::var(PORT_ENV) {
                Ok(v) if !v.trim().is_empty() => parse_port(&v)?,
                _ => DEFAULT_PORT,
            },
        };

        Self::new(protocol, Some(port))
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The primary port, `None` for stdio.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The control-plane port (`port + 1`), `None` for stdio or port 65535.
    pub fn control_port(&self) -> Option<u16> {
        self.port.and_then(|p| p.checked_add(1))
    }
}

/// Parse a port number from a string (environment variable or settings file).
pub fn parse_port(value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::InvalidPort {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_str() {
        assert_eq!("stdio".parse::<Protocol>().unwrap(), Protocol::Stdio);
        assert_eq!(" HTTP ".parse::<Protocol>().unwrap(), Protocol::Http);
        assert_eq!("sse".parse::<Protocol>().unwrap(), Protocol::Sse);
        assert!(matches!(
            "websocket".parse::<Protocol>(),
            Err(ConfigError::UnknownProtocol { .. })
        ));
    }

    #[test]
    fn test_stdio_drops_port() {
        let cfg = ServiceConfig::new(Protocol::Stdio, Some(9000)).unwrap();
        assert_eq!(cfg.port(), None);
        assert_eq!(cfg.control_port(), None);
    }

    #[test]
    fn test_port_protocols_require_port() {
        assert!(matches!(
            ServiceConfig::new(Protocol::Http, None),
            Err(ConfigError::MissingPort { .. })
        ));
        assert!(matches!(
            ServiceConfig::new(Protocol::Sse, Some(0)),
            Err(ConfigError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_control_port_is_next_port() {
        let cfg = ServiceConfig::new(Protocol::Http, Some(9100)).unwrap();
        assert_eq!(cfg.port(), Some(9100));
        assert_eq!(cfg.control_port(), Some(9101));

        let edge = ServiceConfig::new(Protocol::Sse, Some(u16::MAX)).unwrap();
        assert_eq!(edge.control_port(), None);
    }

    #[test]
    fn test_resolve_prefers_overrides() {
        let cfg = ServiceConfig::resolve(Some(Protocol::Sse), Some(7001)).unwrap();
        assert_eq!(cfg.protocol(), Protocol::Sse);
        assert_eq!(cfg.port(), Some(7001));
    }

    #[test]
    fn test_parse_port_rejects_garbage() {
        assert_eq!(parse_port(" 8080 ").unwrap(), 8080);
        assert!(parse_port("70000").is_err());
        assert!(parse_port("abc").is_err());
    }
}
