//! Liveness probe.

use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::time::Duration;

/// Connect timeout for a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Whether something accepts TCP connections on `127.0.0.1:port`.
///
/// Best effort: every connect error (refused, timeout, unreachable) reads
/// as "not in use".
pub fn is_port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, PROBE_TIMEOUT).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_tracks_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_port_in_use(port));

        drop(listener);
        assert!(!is_port_in_use(port));
    }

    #[test]
    fn test_port_zero_is_never_in_use() {
        assert!(!is_port_in_use(0));
    }
}
