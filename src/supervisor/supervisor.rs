//! Service supervisor: owns the background worker and its control listener.
//!
//! The embedded MCP service runs on a dedicated OS thread with its own
//! current-thread tokio runtime, so the caller's thread (CLI, tests, the
//! control listener) never has to be inside a runtime. `start`/`stop` are
//! serialized by one lifecycle mutex. Each worker generation gets its own
//! running flag, cleared by the worker on its way out; the supervisor points
//! at the current generation's flag.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use super::control::ControlListener;
use super::errors::SupervisorError;
use super::probe::is_port_in_use;
use super::shutdown::{self, REPROBE_ATTEMPTS, REPROBE_INTERVAL};
use crate::config::{Protocol, ServiceConfig, Settings};
use crate::mcp_server::http::{self, HttpTransport};
use crate::mcp_server::{stdio, McpServer, ToolRegistry};

// ─── Constants ───────────────────────────────────────────────────────────────

/// How long `start` waits for the worker's readiness signal.
pub const STARTUP_GRACE: Duration = Duration::from_secs(2);

/// How long `stop` waits for the worker to exit after cancellation.
pub const WORKER_EXIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Budget for tasks still running when the worker's runtime shuts down.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Poll interval of [`Supervisor::wait_until_stopped`].
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Interface the HTTP/SSE listeners bind. Liveness checks dial the same one.
const LISTEN_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

// ─── State ───────────────────────────────────────────────────────────────────

/// Byte streams a stdio worker speaks over instead of the process's own.
struct StdioStreams {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    writer: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Handle to the owned worker thread.
struct WorkerHandle {
    thread: JoinHandle<()>,
    cancel: CancellationToken,
    exited: mpsc::Receiver<()>,
    /// This generation's running flag.
    running: Arc<AtomicBool>,
}

#[derive(Default)]
struct SupervisorState {
    started_at: Option<DateTime<Utc>>,
    started_instant: Option<Instant>,
    worker: Option<WorkerHandle>,
    control: Option<ControlListener>,
    /// Consumed by the next stdio start; `None` means stdin/stdout.
    stdio: Option<StdioStreams>,
}

/// Clears its generation's flag and signals exit when the worker thread
/// unwinds or returns.
struct WorkerExitGuard {
    running: Arc<AtomicBool>,
    exited: mpsc::Sender<()>,
}

impl Drop for WorkerExitGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.exited.send(());
    }
}

// ─── Supervisor ──────────────────────────────────────────────────────────────

/// Starts, observes, and stops one embedded service instance.
///
/// Shared through `Arc`: the control listener holds a weak reference so a
/// remote `SHUTDOWN` can call [`Supervisor::stop`].
pub struct Supervisor {
    settings: Settings,
    state: Mutex<SupervisorState>,
    running: Mutex<Arc<AtomicBool>>,
}

impl Supervisor {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            state: Mutex::new(SupervisorState::default()),
            running: Mutex::new(Arc::new(AtomicBool::new(false))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn running_slot(&self) -> MutexGuard<'_, Arc<AtomicBool>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The current generation's running flag.
    fn running_flag(&self) -> bool {
        self.running_slot().load(Ordering::SeqCst)
    }

    /// Start the service. False when already running or when startup fails.
    pub fn start(self: &Arc<Self>, config: &ServiceConfig) -> bool {
        let mut state = self.lock();
        if self.running_flag() {
            tracing::warn!(protocol = %config.protocol(), port = ?config.port(), "service already running");
            return false;
        }

        // Registration completes before the worker exists.
        let registry = ToolRegistry::with_video_tools();
        let server = match McpServer::new(registry, self.settings.clone()) {
            Ok(server) => Arc::new(server),
            Err(e) => {
                let err = SupervisorError::Handler {
                    reason: e.to_string(),
                };
                tracing::error!(error = %err, "service not started");
                return false;
            }
        };

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), SupervisorError>>();
        let (exit_tx, exit_rx) = mpsc::channel::<()>();

        let running = Arc::new(AtomicBool::new(true));
        *self.running_slot() = running.clone();
        let guard = WorkerExitGuard {
            running: running.clone(),
            exited: exit_tx,
        };
        let worker_config = *config;
        let worker_cancel = cancel.clone();
        let streams = match config.protocol() {
            Protocol::Stdio => state.stdio.take(),
            Protocol::Http | Protocol::Sse => None,
        };

        let spawned = std::thread::Builder::new()
            .name("mcp-worker".into())
            .spawn(move || {
                let _guard = guard;
                run_worker(worker_config, server, streams, worker_cancel, ready_tx);
            });

        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                // The closure (and its guard) was dropped, clearing the flag.
                let err = SupervisorError::WorkerSpawn {
                    reason: e.to_string(),
                };
                tracing::error!(error = %err, "service not started");
                return false;
            }
        };

        let worker = WorkerHandle {
            thread,
            cancel,
            exited: exit_rx,
            running: running.clone(),
        };

        match ready_rx.recv_timeout(STARTUP_GRACE) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(error = %err, "service failed to start");
                join_worker(worker, WORKER_EXIT_TIMEOUT);
                return false;
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    grace_ms = STARTUP_GRACE.as_millis() as u64,
                    "no readiness signal within grace interval"
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                tracing::error!("worker exited before reporting readiness");
            }
        }

        if !running.load(Ordering::SeqCst) {
            join_worker(worker, WORKER_EXIT_TIMEOUT);
            return false;
        }

        state.worker = Some(worker);
        state.started_at = Some(Utc::now());
        state.started_instant = Some(Instant::now());

        if let Some(control_port) = config.control_port() {
            let weak = Arc::downgrade(self);
            let stop_config = *config;
            let on_shutdown = move || {
                weak.upgrade()
                    .map(|supervisor| supervisor.stop(&stop_config))
                    .unwrap_or(true)
            };
            match ControlListener::spawn(control_port, on_shutdown) {
                Ok(listener) => state.control = Some(listener),
                Err(e) => {
                    tracing::warn!(
                        port = control_port,
                        error = %e,
                        "control listener unavailable; cross-process shutdown limited"
                    );
                }
            }
        }

        tracing::info!(protocol = %config.protocol(), port = ?config.port(), "service started");
        true
    }

    /// Stop the service, wherever it runs. Safe to call repeatedly.
    pub fn stop(&self, config: &ServiceConfig) -> bool {
        let mut state = self.lock();
        let port = config.port();
        let owned = state.worker.is_some();

        if !owned && !port.is_some_and(is_port_in_use) {
            tracing::info!(protocol = %config.protocol(), port = ?port, "service already stopped");
            return true;
        }

        let mut stopped = false;

        if let Some(worker) = state.worker.take() {
            if let Some(control) = state.control.take() {
                tracing::debug!(port = control.port(), "closing control listener");
                control.signal_stop();
            }
            tracing::info!("cancelling in-process service");
            stopped = self.retire_worker(worker, WORKER_EXIT_TIMEOUT);
            state.started_at = None;
            state.started_instant = None;
        }

        match port {
            Some(port) => {
                if !stopped {
                    stopped = shutdown::run_chain(&shutdown::default_strategies(), port);
                }
                let released = shutdown::wait_for_port_release(port, REPROBE_ATTEMPTS, REPROBE_INTERVAL);
                let success = released || stopped;
                if success {
                    tracing::info!(port, "service stopped");
                } else {
                    tracing::error!(port, "all shutdown strategies failed");
                }
                success
            }
            // stdio has no out-of-process path: only the worker's own exit counts.
            None => stopped,
        }
    }

    /// Cancel `worker` and wait for it to exit. A worker that outlives
    /// `timeout` is detached and the supervisor moves to a fresh, cleared
    /// flag, so the stale thread can no longer block or clear a later start.
    fn retire_worker(&self, worker: WorkerHandle, timeout: Duration) -> bool {
        worker.cancel.cancel();
        let generation = worker.running.clone();
        if join_worker(worker, timeout) {
            return true;
        }

        let mut slot = self.running_slot();
        if Arc::ptr_eq(&slot, &generation) {
            *slot = Arc::new(AtomicBool::new(false));
        }
        false
    }

    /// Whether the service is up. Port protocols also require the port to
    /// accept connections.
    pub fn is_running(&self, config: &ServiceConfig) -> bool {
        let flag = self.running_flag();
        match config.port() {
            Some(port) => flag && is_port_in_use(port),
            None => flag,
        }
    }

    /// Whether this process owns a worker.
    pub fn owns_worker(&self) -> bool {
        self.lock().worker.is_some()
    }

    /// When the owned worker was started.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.lock().started_at
    }

    /// Time since the owned worker was started.
    pub fn uptime(&self) -> Option<Duration> {
        self.lock().started_instant.map(|t| t.elapsed())
    }

    /// Resolve once the running flag clears.
    pub async fn wait_until_stopped(&self) {
        while self.running_flag() {
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    }

    /// Route the next stdio start over `reader`/`writer`.
    #[cfg(test)]
    fn with_stdio<R, W>(self, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        self.lock().stdio = Some(StdioStreams {
            reader: Box::new(reader),
            writer: Box::new(writer),
        });
        self
    }
}

/// Wait for the worker's exit signal, then join it. On timeout the thread
/// is detached.
fn join_worker(worker: WorkerHandle, timeout: Duration) -> bool {
    match worker.exited.recv_timeout(timeout) {
        Ok(()) | Err(RecvTimeoutError::Disconnected) => {
            if worker.thread.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
            true
        }
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(
                timeout_ms = timeout.as_millis() as u64,
                "worker did not exit in time; detaching thread"
            );
            false
        }
    }
}

// ─── Worker ──────────────────────────────────────────────────────────────────

fn run_worker(
    config: ServiceConfig,
    server: Arc<McpServer>,
    streams: Option<StdioStreams>,
    cancel: CancellationToken,
    ready: mpsc::Sender<Result<(), SupervisorError>>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(SupervisorError::Runtime {
                reason: e.to_string(),
            }));
            return;
        }
    };

    if let Err(err) = runtime.block_on(serve(config, server, streams, cancel, ready)) {
        tracing::error!(error = %err, "service loop ended with error");
    }
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    tracing::info!(protocol = %config.protocol(), "worker exited");
}

async fn serve(
    config: ServiceConfig,
    server: Arc<McpServer>,
    streams: Option<StdioStreams>,
    cancel: CancellationToken,
    ready: mpsc::Sender<Result<(), SupervisorError>>,
) -> Result<(), SupervisorError> {
    let serve_err = |e: std::io::Error| SupervisorError::Serve {
        reason: e.to_string(),
    };

    let transport = match config.protocol() {
        Protocol::Http => Some(HttpTransport::Streamable),
        Protocol::Sse => Some(HttpTransport::Sse),
        Protocol::Stdio => None,
    };

    match (transport, config.port()) {
        (Some(transport), Some(port)) => {
            let listener = match tokio::net::TcpListener::bind((LISTEN_HOST, port)).await {
                Ok(listener) => listener,
                Err(e) => {
                    let _ = ready.send(Err(SupervisorError::Bind {
                        addr: format!("{LISTEN_HOST}:{port}"),
                        reason: e.to_string(),
                    }));
                    return Ok(());
                }
            };
            tracing::info!(protocol = %config.protocol(), host = %LISTEN_HOST, port, "listening");
            let _ = ready.send(Ok(()));
            http::serve(listener, server, transport, cancel).await.map_err(serve_err)
        }
        _ => {
            tracing::info!("serving MCP over stdio");
            let _ = ready.send(Ok(()));
            let result = match streams {
                Some(StdioStreams { reader, writer }) => stdio::serve(server, reader, writer, cancel).await,
                None => stdio::serve(server, tokio::io::stdin(), tokio::io::stdout(), cancel).await,
            };
            result.map_err(serve_err)
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
