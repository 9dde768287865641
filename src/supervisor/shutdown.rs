//! Cross-process shutdown strategies.
//!
//! Tried in order after in-process cancellation, stopping at the first one
//! that reports [`StrategyOutcome::Stopped`]:
//! 1. control-plane handshake on `port + 1`
//! 2. process termination (platforms exposing command lines and socket
//!    ownership, i.e. Linux `/proc`)
//! 3. platform port-owner fallback (Windows `netstat`/`taskkill`, macOS `lsof`)
//!
//! No strategy failure is fatal; each one logs and falls through.

use std::time::Duration;

use super::control;
use super::probe::is_port_in_use;

/// Connect/read/write timeout for the control handshake.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait after SIGTERM before confirming with the probe.
pub const TERMINATION_GRACE: Duration = Duration::from_secs(2);

/// Re-probe attempts after the chain has run.
pub const REPROBE_ATTEMPTS: u32 = 5;

/// Interval between re-probes.
pub const REPROBE_INTERVAL: Duration = Duration::from_secs(1);

// ─── Strategy ────────────────────────────────────────────────────────────────

/// Result of one shutdown attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyOutcome {
    /// The service was stopped.
    Stopped,
    /// The strategy does not apply here (platform, nothing to target).
    NotApplicable(String),
    /// The strategy applied but did not stop the service.
    Failed(String),
}

/// One way of stopping a service listening on `port`.
pub trait ShutdownStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn attempt(&self, port: u16) -> StrategyOutcome;
}

/// The out-of-process strategies, in order.
pub fn default_strategies() -> Vec<Box<dyn ShutdownStrategy>> {
    vec![
        Box::new(ControlHandshake {
            timeout: HANDSHAKE_TIMEOUT,
        }),
        Box::new(ProcessTermination {
            grace: TERMINATION_GRACE,
        }),
        Box::new(PortOwnerFallback),
    ]
}

/// Run `strategies` in order; true as soon as one reports `Stopped`.
pub fn run_chain(strategies: &[Box<dyn ShutdownStrategy>], port: u16) -> bool {
    for strategy in strategies {
        match strategy.attempt(port) {
            StrategyOutcome::Stopped => {
                tracing::info!(strategy = strategy.name(), port, "service stopped");
                return true;
            }
            StrategyOutcome::NotApplicable(reason) => {
                tracing::debug!(strategy = strategy.name(), port, %reason, "strategy skipped");
            }
            StrategyOutcome::Failed(reason) => {
                tracing::warn!(strategy = strategy.name(), port, %reason, "strategy failed");
            }
        }
    }
    false
}

/// Probe `port` up to `attempts` times, `interval` apart, until it is free.
pub fn wait_for_port_release(port: u16, attempts: u32, interval: Duration) -> bool {
    for attempt in 1..=attempts {
        if !is_port_in_use(port) {
            return true;
        }
        if attempt < attempts {
            std::thread::sleep(interval);
        }
    }
    tracing::warn!(port, attempts, "port still in use after shutdown");
    false
}

// ─── Control handshake ───────────────────────────────────────────────────────

/// Send `SHUTDOWN` to the service's control listener.
pub struct ControlHandshake {
    pub timeout: Duration,
}

impl ShutdownStrategy for ControlHandshake {
    fn name(&self) -> &'static str {
        "control_handshake"
    }

    fn attempt(&self, port: u16) -> StrategyOutcome {
        let Some(control_port) = port.checked_add(1) else {
            return StrategyOutcome::NotApplicable("no control port above 65535".into());
        };

        match control::request_shutdown(control_port, self.timeout) {
            Ok(true) => StrategyOutcome::Stopped,
            Ok(false) => StrategyOutcome::Failed("unexpected control response".into()),
            Err(e) => StrategyOutcome::Failed(format!("listener not reachable: {e}")),
        }
    }
}

// ─── Process termination ─────────────────────────────────────────────────────

/// Find this executable's `start` process holding the port and SIGTERM it.
pub struct ProcessTermination {
    pub grace: Duration,
}

impl ShutdownStrategy for ProcessTermination {
    fn name(&self) -> &'static str {
        "process_termination"
    }

    #[cfg(target_os = "linux")]
    fn attempt(&self, port: u16) -> StrategyOutcome {
        use super::process;

        let Some(exe_stem) = process::current_exe_stem() else {
            return StrategyOutcome::Failed("cannot determine current executable".into());
        };

        let inodes = process::listening_inodes(port);
        if inodes.is_empty() {
            return StrategyOutcome::Failed(format!("no listening socket found for port {port}"));
        }

        let system = sysinfo::System::new_all();
        let owners: Vec<u32> = process::service_candidates(&system, &exe_stem)
            .into_iter()
            .filter(|pid| process::owns_any_socket(*pid, &inodes))
            .collect();

        if owners.is_empty() {
            return StrategyOutcome::Failed("no matching service process owns the port".into());
        }

        let mut signalled = false;
        for pid in owners {
            if process::terminate(&system, pid) {
                tracing::info!(pid, port, "sent SIGTERM to service process");
                signalled = true;
            } else {
                tracing::warn!(pid, port, "failed to signal service process");
            }
        }
        if !signalled {
            return StrategyOutcome::Failed("could not signal any owning process".into());
        }

        std::thread::sleep(self.grace);
        if is_port_in_use(port) {
            StrategyOutcome::Failed("port still in use after SIGTERM".into())
        } else {
            StrategyOutcome::Stopped
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn attempt(&self, _port: u16) -> StrategyOutcome {
        StrategyOutcome::NotApplicable("unsupported on this platform".into())
    }
}

// ─── Platform fallback ───────────────────────────────────────────────────────

/// Kill whatever owns the port, using the platform's own tools.
///
/// Only runs where [`ProcessTermination`] is unsupported.
pub struct PortOwnerFallback;

impl ShutdownStrategy for PortOwnerFallback {
    fn name(&self) -> &'static str {
        "port_owner_fallback"
    }

    #[cfg(windows)]
    fn attempt(&self, port: u16) -> StrategyOutcome {
        use super::process::parse_netstat_pids;

        let output = match std::process::Command::new("netstat").arg("-ano").output() {
            Ok(o) => o,
            Err(e) => return StrategyOutcome::Failed(format!("netstat failed: {e}")),
        };
        let pids = parse_netstat_pids(&String::from_utf8_lossy(&output.stdout), port);
        if pids.is_empty() {
            return StrategyOutcome::Failed(format!("no process listening on port {port}"));
        }

        let mut killed = false;
        for pid in pids {
            let status = std::process::Command::new("taskkill")
                .args(["/PID", &pid.to_string(), "/F"])
                .status();
            match status {
                Ok(s) if s.success() => {
                    tracing::info!(pid, port, "taskkill succeeded");
                    killed = true;
                }
                Ok(s) => tracing::warn!(pid, port, code = ?s.code(), "taskkill failed"),
                Err(e) => tracing::warn!(pid, port, error = %e, "taskkill could not run"),
            }
        }

        if killed {
            StrategyOutcome::Stopped
        } else {
            StrategyOutcome::Failed("taskkill did not stop any process".into())
        }
    }

    #[cfg(target_os = "macos")]
    fn attempt(&self, port: u16) -> StrategyOutcome {
        use super::process::{force_kill, parse_lsof_pids};

        let output = std::process::Command::new("lsof")
            .args(["-nP", &format!("-iTCP:{port}"), "-sTCP:LISTEN", "-t"])
            .output();
        let output = match output {
            Ok(o) => o,
            Err(e) => return StrategyOutcome::Failed(format!("lsof failed: {e}")),
        };

        let own_pid = std::process::id();
        let pids: Vec<u32> = parse_lsof_pids(&String::from_utf8_lossy(&output.stdout))
            .into_iter()
            .filter(|pid| *pid != own_pid)
            .collect();
        if pids.is_empty() {
            return StrategyOutcome::Failed(format!("no process listening on port {port}"));
        }

        let system = sysinfo::System::new_all();
        let mut killed = false;
        for pid in pids {
            if force_kill(&system, pid) {
                tracing::info!(pid, port, "killed port owner");
                killed = true;
            }
        }

        if killed {
            StrategyOutcome::Stopped
        } else {
            StrategyOutcome::Failed("could not kill any port owner".into())
        }
    }

    #[cfg(target_os = "linux")]
    fn attempt(&self, _port: u16) -> StrategyOutcome {
        StrategyOutcome::NotApplicable("process termination is handled via /proc".into())
    }

    #[cfg(not(any(windows, target_os = "macos", target_os = "linux")))]
    fn attempt(&self, _port: u16) -> StrategyOutcome {
        StrategyOutcome::NotApplicable("unsupported on this platform".into())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
