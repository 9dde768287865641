//! Command-line façade: `start|stop|status|ping|version|help`.
//!
//! Every command produces one [`CliResponse`]; `--json` renders it as a
//! JSON object, otherwise the message line is printed. Exit code 0 on
//! success, 1 on failure, unhealthy, or not running.

pub mod commands;
pub mod response;

use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use crate::config::Protocol;

pub use commands::{report_parse_error, run};
pub use response::{messages, CliResponse};

/// video_server MCP server.
#[derive(Debug, Parser)]
#[command(
    name = "video-mcp-server",
    version,
    about = "Video MCP Server",
    after_help = "Examples:\n  video-mcp-server start\n  video-mcp-server start --json\n  \
                  video-mcp-server stop\n  video-mcp-server status --json\n  \
                  video-mcp-server ping\n  video-mcp-server version"
)]
pub struct Cli {
    /// Command to run.
    #[arg(value_enum)]
    pub command: Command,

    /// Print the response as a JSON object.
    #[arg(long)]
    pub json: bool,

    /// Timeout in seconds for calls to the video data service [default: 30].
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Service port (ignored for stdio).
    #[arg(long)]
    pub port: Option<u16>,

    /// Communication protocol.
    #[arg(long, value_enum)]
    pub protocol: Option<Protocol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Command {
    Start,
    Stop,
    Status,
    Ping,
    Version,
    Help,
}

impl From<CliResponse> for ExitCode {
    fn from(response: CliResponse) -> Self {
        ExitCode::from(response.exit_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "video-mcp-server",
            "status",
            "--json",
            "--port",
            "6000",
            "--protocol",
            "sse",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::Status);
        assert!(cli.json);
        assert_eq!(cli.port, Some(6000));
        assert_eq!(cli.protocol, Some(Protocol::Sse));
        assert_eq!(cli.timeout, None);
    }

    #[test]
    fn test_help_is_a_command() {
        let cli = Cli::try_parse_from(["video-mcp-server", "help"]).unwrap();
        assert_eq!(cli.command, Command::Help);
    }

    #[test]
    fn test_rejects_unknown_command_and_protocol() {
        assert!(Cli::try_parse_from(["video-mcp-server", "restart"]).is_err());
        assert!(Cli::try_parse_from(["video-mcp-server", "start", "--protocol", "grpc"]).is_err());
        assert!(Cli::try_parse_from(["video-mcp-server"]).is_err());
    }
}
