//! Control-plane listener on `port + 1`.
//!
//! A tiny unframed protocol: the client writes `SHUTDOWN`, the listener
//! stops the service, answers `OK`, and exits. Any other payload closes the
//! connection without a reply. Lets a second process stop a service it did
//! not start.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use super::errors::SupervisorError;

/// Request token.
pub const SHUTDOWN_COMMAND: &[u8] = b"SHUTDOWN";

/// Response token.
pub const SHUTDOWN_ACK: &[u8] = b"OK";

/// Largest payload read from one connection.
const MAX_MESSAGE_BYTES: usize = 1024;

/// How long one accept poll waits before re-checking the stop flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Read/write timeout on an accepted connection.
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Listener ────────────────────────────────────────────────────────────────

/// Handle to a running control listener thread.
///
/// Dropping the handle detaches the thread; call [`ControlListener::signal_stop`]
/// to make it exit. The handle is never joined from `stop`, since the
/// listener thread itself may be the caller.
#[derive(Debug)]
pub struct ControlListener {
    port: u16,
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl ControlListener {
    /// Bind `127.0.0.1:port` and serve on a dedicated thread.
    ///
    /// `on_shutdown` runs synchronously on the listener thread when a
    /// `SHUTDOWN` arrives; its result is logged and `OK` is sent either way.
    pub fn spawn<F>(port: u16, on_shutdown: F) -> Result<Self, SupervisorError>
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let listener = bind_control_socket(port)?;
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let thread = std::thread::Builder::new()
            .name("control-listener".into())
            .spawn(move || accept_loop(listener, port, stop_flag, on_shutdown))
            .map_err(|e| SupervisorError::WorkerSpawn {
                reason: e.to_string(),
            })?;

        tracing::info!(port, "control listener started");
        Ok(Self { port, stop, thread })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Ask the accept loop to exit at its next poll.
    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the listener thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Bind the control socket with `SO_REUSEADDR` and a backlog of 1.
fn bind_control_socket(port: u16) -> Result<TcpListener, SupervisorError> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let bind_err = |e: io::Error| SupervisorError::Bind {
        addr: addr.to_string(),
        reason: e.to_string(),
    };

    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(bind_err)?;
    socket.set_reuse_address(true).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.listen(1).map_err(bind_err)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true).map_err(bind_err)?;
    Ok(listener)
}

fn accept_loop<F>(listener: TcpListener, port: u16, stop: Arc<AtomicBool>, on_shutdown: F)
where
    F: FnOnce() -> bool,
{
    let mut on_shutdown = Some(on_shutdown);

    while !stop.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok((stream, peer)) => {
                tracing::debug!(%peer, "control connection accepted");
                stream
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
            Err(e) => {
                tracing::warn!(port, error = %e, "control accept failed");
                std::thread::sleep(ACCEPT_POLL_INTERVAL);
                continue;
            }
        };

        match read_command(stream) {
            Ok((mut stream, payload)) if payload == SHUTDOWN_COMMAND => {
                tracing::info!(port, "shutdown requested over control plane");
                let stopped = on_shutdown.take().map(|f| f()).unwrap_or(true);
                if !stopped {
                    tracing::warn!(port, "in-process stop reported failure");
                }
                if let Err(e) = stream.write_all(SHUTDOWN_ACK).and_then(|_| stream.flush()) {
                    tracing::warn!(port, error = %e, "failed to send shutdown ack");
                }
                break;
            }
            Ok((_, payload)) => {
                tracing::debug!(port, bytes = payload.len(), "ignoring unknown control payload");
            }
            Err(e) => {
                tracing::debug!(port, error = %e, "control connection read failed");
            }
        }
    }

    tracing::info!(port, "control listener exited");
}

/// Read one command (at most [`MAX_MESSAGE_BYTES`]) from a fresh connection.
///
/// Reading continues only while the bytes so far are a strict prefix of
/// `SHUTDOWN`, so a split write is tolerated without waiting for EOF.
fn read_command(stream: TcpStream) -> io::Result<(TcpStream, Vec<u8>)> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(CONNECTION_TIMEOUT))?;
    stream.set_write_timeout(Some(CONNECTION_TIMEOUT))?;

    let mut buf = [0u8; MAX_MESSAGE_BYTES];
    let mut len = 0;
    let mut reader = &stream;
    loop {
        let n = reader.read(&mut buf[len..])?;
        if n == 0 {
            break;
        }
        len += n;
        let partial = len < SHUTDOWN_COMMAND.len() && SHUTDOWN_COMMAND.starts_with(&buf[..len]);
        if !partial || len == MAX_MESSAGE_BYTES {
            break;
        }
    }

    Ok((stream, buf[..len].to_vec()))
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// Send `SHUTDOWN` to `127.0.0.1:port` and report whether `OK` came back.
pub fn request_shutdown(port: u16, timeout: Duration) -> io::Result<bool> {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    stream.write_all(SHUTDOWN_COMMAND)?;
    stream.flush()?;

    let mut response = Vec::with_capacity(SHUTDOWN_ACK.len());
    (&stream)
        .take(MAX_MESSAGE_BYTES as u64)
        .read_to_end(&mut response)?;

    Ok(response == SHUTDOWN_ACK)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn free_port() -> u16 {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    }

    #[test]
    fn test_shutdown_round_trip_runs_callback_once() {
        let port = free_port();
        let (tx, rx) = mpsc::channel();
        let listener = ControlListener::spawn(port, move || {
            tx.send(()).unwrap();
            true
        })
        .unwrap();
        assert_eq!(listener.port(), port);

        assert!(request_shutdown(port, Duration::from_secs(5)).unwrap());
        rx.recv_timeout(Duration::from_secs(1)).unwrap();

        // Single-shot: the thread exits after acknowledging.
        for _ in 0..20 {
            if listener.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(listener.is_finished());
    }

    #[test]
    fn test_unknown_payload_gets_no_reply() {
        let port = free_port();
        let (tx, rx) = mpsc::channel::<()>();
        let listener = ControlListener::spawn(port, move || {
            tx.send(()).unwrap();
            true
        })
        .unwrap();

        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        stream.write_all(b"RESTART").unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).unwrap();
        assert!(reply.is_empty());
        assert!(rx.try_recv().is_err());

        // Still accepting after a bad payload.
        assert!(!listener.is_finished());
        listener.signal_stop();
    }

    #[test]
    fn test_stop_flag_ends_loop() {
        let port = free_port();
        let listener = ControlListener::spawn(port, || true).unwrap();
        listener.signal_stop();
        for _ in 0..20 {
            if listener.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(listener.is_finished());
    }

    #[test]
    fn test_request_shutdown_unreachable() {
        let port = free_port();
        assert!(request_shutdown(port, Duration::from_secs(1)).is_err());
    }
}
