//! Command handlers.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::CommandFactory;
use serde_json::json;

use super::response::{messages, CliResponse};
use super::{Cli, Command};
use crate::config::{Protocol, ServiceConfig, Settings, DEFAULT_PORT, PORT_ENV, PROTOCOL_ENV};
use crate::supervisor::{is_port_in_use, Supervisor};

/// Where a response is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Output {
    Stdout,
    /// stdout carries the JSON-RPC stream (stdio `start`).
    Stderr,
}

/// Run a parsed command line and return the process exit code.
pub fn run(cli: Cli) -> ExitCode {
    if cli.command == Command::Help {
        let _ = Cli::command().print_long_help();
        return ExitCode::SUCCESS;
    }

    export_flags(&cli);

    let (protocol, port) = fallback_target(&cli);
    let output = output_for(cli.command, protocol);

    let response = match execute(&cli) {
        Ok(Some(response)) => response,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(command = ?cli.command, error = %format!("{e:#}"), "command failed");
            CliResponse::new(false, messages::error(format!("{e:#}")), protocol, port)
        }
    };

    emit(&response, cli.json, output);
    response.into()
}

/// Render a clap error. Help/version requests exit 0; anything else becomes
/// an `Error: …` response.
pub fn report_parse_error(err: clap::Error, json: bool) -> ExitCode {
    use clap::error::ErrorKind;

    if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        let _ = err.print();
        return ExitCode::SUCCESS;
    }

    let rendered = err.to_string();
    let detail = rendered
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches("error: ")
        .to_string();
    let (protocol, port) = env_target();
    let response = CliResponse::new(false, messages::error(detail), protocol, port);
    emit(&response, json, Output::Stdout);
    response.into()
}

fn execute(cli: &Cli) -> anyhow::Result<Option<CliResponse>> {
    let config = ServiceConfig::resolve(cli.protocol, cli.port).context("invalid service configuration")?;
    let mut settings = Settings::load().context("failed to load settings")?;
    if let Some(secs) = cli.timeout {
        settings = settings.with_request_timeout(Duration::from_secs(secs));
    }

    tracing::info!(
        command = ?cli.command,
        protocol = %config.protocol(),
        port = ?config.port(),
        settings = ?settings,
        "running command"
    );

    match cli.command {
        Command::Start => start(&config, settings, cli.json),
        Command::Stop => Ok(Some(stop(&config, settings))),
        Command::Status => Ok(Some(status(&config))),
        Command::Ping => Ok(Some(ping(&config))),
        Command::Version => Ok(Some(version(&config))),
        // Handled before configuration is resolved.
        Command::Help => Ok(None),
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Start the service and wait in the foreground until it stops.
///
/// Returns `None` when the service stopped on its own (e.g. a remote
/// `SHUTDOWN`) after the start response was already printed.
fn start(config: &ServiceConfig, settings: Settings, json: bool) -> anyhow::Result<Option<CliResponse>> {
    let supervisor = Arc::new(Supervisor::new(settings));
    let output = output_for(Command::Start, config.protocol());

    if !supervisor.start(config) {
        return Ok(Some(CliResponse::new(
            false,
            messages::START_FAILED,
            config.protocol(),
            config.port(),
        )));
    }

    let data = config.port().map(|port| json!({ "port": port })).unwrap_or(json!({}));
    let started = CliResponse::new(true, messages::started(config.port()), config.protocol(), config.port())
        .with_data(data);
    emit(&started, json, output);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    let interrupted = runtime.block_on(async {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C; waiting for shutdown");
                    supervisor.wait_until_stopped().await;
                    false
                }
            },
            _ = supervisor.wait_until_stopped() => false,
        }
    });

    if !interrupted {
        tracing::info!("service stopped; leaving foreground wait");
        return Ok(None);
    }

    tracing::info!("interrupt received; stopping service");
    if !supervisor.stop(config) {
        tracing::warn!("best-effort stop after interrupt failed");
    }
    Ok(Some(CliResponse::new(
        true,
        messages::INTERRUPTED,
        config.protocol(),
        config.port(),
    )))
}

fn stop(config: &ServiceConfig, settings: Settings) -> CliResponse {
    let supervisor = Supervisor::new(settings);
    let stopped = supervisor.stop(config);
    let message = if stopped {
        messages::STOPPED
    } else {
        messages::STOP_FAILED
    };
    CliResponse::new(stopped, message, config.protocol(), config.port())
}

/// Cross-process view of the service. stdio cannot be observed from
/// another process and always reads as stopped.
fn probe(config: &ServiceConfig) -> bool {
    config.port().is_some_and(is_port_in_use)
}

fn target_data(config: &ServiceConfig, status: &str) -> serde_json::Value {
    let mut data = json!({
        "status": status,
        "protocol": config.protocol(),
    });
    if let Some(port) = config.port() {
        data["port"] = json!(port);
    }
    data
}

fn status(config: &ServiceConfig) -> CliResponse {
    let running = probe(config);
    let (message, state) = if running {
        (messages::RUNNING, "running")
    } else {
        (messages::NOT_RUNNING, "stopped")
    };
    CliResponse::new(running, message, config.protocol(), config.port())
        .with_data(target_data(config, state))
}

fn ping(config: &ServiceConfig) -> CliResponse {
    let healthy = probe(config);
    let (message, state) = if healthy {
        (messages::PING_OK, "healthy")
    } else {
        (messages::PING_FAILED, "unhealthy")
    };
    CliResponse::new(healthy, message, config.protocol(), config.port())
        .with_data(target_data(config, state))
}

fn version(config: &ServiceConfig) -> CliResponse {
    let version = env!("CARGO_PKG_VERSION");
    let mut data = json!({
        "version": version,
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "protocol": config.protocol(),
    });
    if let Some(port) = config.port() {
        data["port"] = json!(port);
    }
    CliResponse::new(true, messages::version(version), config.protocol(), config.port()).with_data(data)
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Re-export `--port`/`--protocol` so child code reading the environment
/// sees the same values.
fn export_flags(cli: &Cli) {
    if let Some(port) = cli.port {
        std::env::set_var(PORT_ENV, port.to_string());
    }
    if let Some(protocol) = cli.protocol {
        std::env::set_var(PROTOCOL_ENV, protocol.as_str());
    }
}

/// Protocol/port to report when configuration itself fails to resolve.
fn fallback_target(cli: &Cli) -> (Protocol, Option<u16>) {
    let (env_protocol, env_port) = env_target();
    (cli.protocol.unwrap_or(env_protocol), cli.port.or(env_port))
}

fn env_target() -> (Protocol, Option<u16>) {
    let protocol = std::env::var(PROTOCOL_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(Protocol::Http);
    let port = std::env::var(PORT_ENV)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_PORT);
    (protocol, Some(port))
}

fn output_for(command: Command, protocol: Protocol) -> Output {
    if command == Command::Start && protocol == Protocol::Stdio {
        Output::Stderr
    } else {
        Output::Stdout
    }
}

fn emit(response: &CliResponse, json: bool, output: Output) {
    let line = response.render(json);
    let result = match output {
        Output::Stdout => writeln!(std::io::stdout(), "{line}").and_then(|_| std::io::stdout().flush()),
        Output::Stderr => writeln!(std::io::stderr(), "{line}"),
    };
    if let Err(e) = result {
        tracing::warn!(error = %e, "failed to write CLI response");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn http(port: u16) -> ServiceConfig {
        ServiceConfig::new(Protocol::Http, Some(port)).unwrap()
    }

    #[test]
    fn test_status_and_ping_track_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = http(listener.local_addr().unwrap().port());

        let up = status(&config);
        assert!(up.success);
        assert_eq!(up.message, messages::RUNNING);
        assert_eq!(up.data.as_ref().unwrap()["status"], "running");

        let healthy = ping(&config);
        assert_eq!(healthy.data.as_ref().unwrap()["status"], "healthy");

        drop(listener);
        let down = status(&config);
        assert!(!down.success);
        assert_eq!(down.exit_code(), 1);
        assert_eq!(down.data.as_ref().unwrap()["status"], "stopped");
        assert_eq!(ping(&config).message, messages::PING_FAILED);
    }

    #[test]
    fn test_stdio_status_reports_stopped() {
        let config = ServiceConfig::new(Protocol::Stdio, None).unwrap();
        let resp = status(&config);
        assert!(!resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["status"], "stopped");
        assert_eq!(data["protocol"], "stdio");
        assert!(data.get("port").is_none());
    }

    #[test]
    fn test_version_payload() {
        let resp = version(&http(5005));
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(data["arch"], std::env::consts::ARCH);
        assert_eq!(data["port"], 5005);

        let stdio = version(&ServiceConfig::new(Protocol::Stdio, None).unwrap());
        assert!(stdio.data.unwrap().get("port").is_none());
    }

    #[test]
    fn test_stop_when_nothing_runs() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let resp = stop(&http(port), Settings::default());
        assert!(resp.success);
        assert_eq!(resp.message, messages::STOPPED);
        assert!(resp.data.is_none());
    }

    #[test]
    fn test_stdio_start_writes_to_stderr() {
        assert_eq!(output_for(Command::Start, Protocol::Stdio), Output::Stderr);
        assert_eq!(output_for(Command::Start, Protocol::Http), Output::Stdout);
        assert_eq!(output_for(Command::Status, Protocol::Stdio), Output::Stdout);
    }
}
