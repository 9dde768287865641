pub mod cli;
pub mod config;
pub mod mcp_server;
pub mod mock_service;
pub mod supervisor;
pub mod tools;

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

/// Name of the per-user data directory.
const DATA_DIR_NAME: &str = "video-mcp-server";

/// Log file inside [`data_dir`].
const LOG_FILE_NAME: &str = "server.log";

/// Rotated generations kept next to the live log.
const LOG_GENERATIONS: u32 = 3;

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "video_mcp_server=info,warn";

/// Return the platform-standard data directory for the server.
///
/// - macOS: `~/Library/Application Support/video-mcp-server/`
/// - Windows: `{FOLDERID_RoamingAppData}\video-mcp-server\`
/// - Linux: `$XDG_DATA_HOME/video-mcp-server/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.video-mcp-server/` only if none of the above can be resolved.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join(DATA_DIR_NAME);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(format!(".{DATA_DIR_NAME}"))
}

/// Initialize the tracing subscriber for the server CLI.
///
/// Logs never go to stdout: it carries CLI responses and, in stdio mode, the
/// JSON-RPC stream. With `rotate` (used by `start`), existing logs shift
/// `server.log` → `.1` → `.2` → `.3` first. If the log file cannot be
/// opened, logs fall back to stderr.
pub fn init_tracing(rotate: bool) {
    use tracing_subscriber::fmt;

    let log_dir = data_dir();
    let _ = std::fs::create_dir_all(&log_dir);
    let log_path = log_dir.join(LOG_FILE_NAME);

    if rotate {
        shift_server_logs(&log_path, LOG_GENERATIONS);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path);

    let builder = fmt::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    let installed = match log_file {
        Ok(file) => builder.with_writer(ServerLogWriter::new(file)).try_init(),
        Err(_) => builder.with_writer(std::io::stderr).try_init(),
    };
    if installed.is_err() {
        return;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        data_dir = %log_dir.display(),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== video-mcp-server starting ==="
    );
}

/// Initialize tracing to stderr (the mock video service).
pub fn init_stderr_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Make room for a fresh `server.log` before `start` appends to it.
///
/// The current log becomes generation 1 and each older generation moves up
/// one; whatever would land past `generations` is deleted. Gaps are fine.
fn shift_server_logs(log_path: &Path, generations: u32) {
    let _ = std::fs::remove_file(log_generation(log_path, generations));
    for n in (1..generations).rev() {
        let _ = std::fs::rename(log_generation(log_path, n), log_generation(log_path, n + 1));
    }
    if log_path.exists() {
        let _ = std::fs::rename(log_path, log_generation(log_path, 1));
    }
}

/// `server.log` → `server.log.{n}`.
fn log_generation(log_path: &Path, n: u32) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shared handle to `server.log` that pushes every tracing line to disk
/// immediately. A service killed by a shutdown strategy never gets to flush
/// buffered output, and its last lines are the ones worth reading.
#[derive(Clone)]
struct ServerLogWriter {
    file: Arc<Mutex<File>>,
}

impl ServerLogWriter {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }

    fn file(&self) -> MutexGuard<'_, File> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for ServerLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.file();
        let written = file.write(buf)?;
        file.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file().flush()
    }
}

impl<'a> MakeWriter<'a> for ServerLogWriter {
    type Writer = ServerLogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
