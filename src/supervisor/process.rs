//! OS process discovery and termination for cross-process shutdown.
//!
//! Parsers are pure functions over the text the OS hands back
//! (`/proc/net/tcp`, `netstat -ano`, `lsof -t`), so they are tested on any
//! platform. Enumeration and signalling go through `sysinfo`.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;

use sysinfo::{Pid, Signal, System};

/// `st` column value of a listening socket in `/proc/net/tcp{,6}`.
const TCP_LISTEN_STATE: &str = "0A";

// ─── Parsers ─────────────────────────────────────────────────────────────────

/// Socket inodes listening on `port` in the contents of `/proc/net/tcp` or
/// `/proc/net/tcp6`.
///
/// Rows look like
/// `0: 0100007F:138D 00000000:0000 0A 00000000:00000000 00:00000000 00000000 1000 0 12345 ...`
/// where the local port is hex after the last `:` and the inode is the
/// tenth column.
pub fn parse_listen_inodes(contents: &str, port: u16) -> Vec<u64> {
    contents
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN_STATE {
                return None;
            }
            let (_, port_hex) = fields[1].rsplit_once(':')?;
            let local_port = u16::from_str_radix(port_hex, 16).ok()?;
            if local_port != port {
                return None;
            }
            fields[9].parse::<u64>().ok().filter(|inode| *inode != 0)
        })
        .collect()
}

/// Inode of an fd symlink target such as `socket:[12345]`.
pub fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

/// PIDs listening on `port` in Windows `netstat -ano` output.
///
/// Rows look like `  TCP    0.0.0.0:5005    0.0.0.0:0    LISTENING    4242`.
pub fn parse_netstat_pids(output: &str, port: u16) -> Vec<u32> {
    let suffix = format!(":{port}");
    let mut seen = HashSet::new();
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 || !fields[0].eq_ignore_ascii_case("TCP") {
                return None;
            }
            if !fields[1].ends_with(&suffix) || !fields[3].eq_ignore_ascii_case("LISTENING") {
                return None;
            }
            fields[4].parse::<u32>().ok()
        })
        .filter(|pid| *pid != 0 && seen.insert(*pid))
        .collect()
}

/// PIDs in `lsof -t` output (one per line).
pub fn parse_lsof_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse::<u32>().ok())
        .collect()
}

/// Whether a command line runs `exe_stem` with the `start` subcommand.
pub fn is_service_command<S: AsRef<OsStr>>(cmd: &[S], exe_stem: &str) -> bool {
    let Some(program) = cmd.first() else {
        return false;
    };
    let stem_matches = Path::new(program.as_ref())
        .file_stem()
        .and_then(OsStr::to_str)
        .is_some_and(|stem| stem == exe_stem);

    stem_matches && cmd[1..].iter().any(|arg| arg.as_ref() == "start")
}

// ─── Enumeration ─────────────────────────────────────────────────────────────

/// File stem of the running executable (e.g. `video-mcp-server`).
pub fn current_exe_stem() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    exe.file_stem()
        .and_then(OsStr::to_str)
        .map(str::to_string)
}

/// Other processes whose command line is `<our executable> ... start ...`.
pub fn service_candidates(system: &System, exe_stem: &str) -> Vec<u32> {
    let own_pid = std::process::id();
    system
        .processes()
        .iter()
        .filter(|(pid, _)| pid.as_u32() != own_pid)
        .filter(|(_, process)| is_service_command(process.cmd(), exe_stem))
        .map(|(pid, _)| pid.as_u32())
        .collect()
}

/// Listening socket inodes for `port` across IPv4 and IPv6.
#[cfg(target_os = "linux")]
pub fn listening_inodes(port: u16) -> HashSet<u64> {
    ["/proc/net/tcp", "/proc/net/tcp6"]
        .iter()
        .filter_map(|path| std::fs::read_to_string(path).ok())
        .flat_map(|contents| parse_listen_inodes(&contents, port))
        .collect()
}

/// Whether `pid` holds any of `inodes` as an open fd.
#[cfg(target_os = "linux")]
pub fn owns_any_socket(pid: u32, inodes: &HashSet<u64>) -> bool {
    let Ok(entries) = std::fs::read_dir(format!("/proc/{pid}/fd")) else {
        return false;
    };
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| std::fs::read_link(entry.path()).ok())
        .filter_map(|target| target.to_str().and_then(socket_inode))
        .any(|inode| inodes.contains(&inode))
}

// ─── Termination ─────────────────────────────────────────────────────────────

/// Send SIGTERM to `pid`, falling back to a hard kill where SIGTERM is not
/// supported. Returns whether a signal was delivered.
pub fn terminate(system: &System, pid: u32) -> bool {
    let Some(process) = system.process(Pid::from_u32(pid)) else {
        return false;
    };
    match process.kill_with(Signal::Term) {
        Some(sent) => sent,
        None => process.kill(),
    }
}

/// Hard-kill `pid`.
pub fn force_kill(system: &System, pid: u32) -> bool {
    system
        .process(Pid::from_u32(pid))
        .is_some_and(|process| process.kill())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_NET_TCP: &str = "\
  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode
   0: 0100007F:138D 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 424242 1 0000000000000000 100 0 0 10 0
   1: 0100007F:138E 00000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 424243 1 0000000000000000 100 0 0 10 0
   2: 0100007F:138D 0100007F:A1B2 01 00000000:00000000 00:00000000 00000000  1000        0 515151 1 0000000000000000 20 4 30 10 -1
";

    #[test]
    fn test_parse_listen_inodes_matches_port_and_state() {
        // 0x138D == 5005; row 2 is an established connection on the same port.
        assert_eq!(parse_listen_inodes(PROC_NET_TCP, 5005), vec![424242]);
        assert_eq!(parse_listen_inodes(PROC_NET_TCP, 5006), vec![424243]);
        assert!(parse_listen_inodes(PROC_NET_TCP, 8080).is_empty());
    }

    #[test]
    fn test_parse_listen_inodes_ipv6() {
        let tcp6 = "   0: 00000000000000000000000000000000:138D 00000000000000000000000000000000:0000 0A 00000000:00000000 00:00000000 00000000  1000        0 777 1 0000000000000000 100 0 0 10 0\n";
        assert_eq!(parse_listen_inodes(tcp6, 5005), vec![777]);
    }

    #[test]
    fn test_socket_inode() {
        assert_eq!(socket_inode("socket:[424242]"), Some(424242));
        assert_eq!(socket_inode("pipe:[1234]"), None);
        assert_eq!(socket_inode("/dev/null"), None);
    }

    #[test]
    fn test_parse_netstat_pids() {
        let output = "\
Active Connections

  Proto  Local Address          Foreign Address        State           PID
  TCP    0.0.0.0:5005           0.0.0.0:0              LISTENING       4242
  TCP    [::]:5005              [::]:0                 LISTENING       4242
  TCP    127.0.0.1:5005         127.0.0.1:50123        ESTABLISHED     4242
  TCP    0.0.0.0:15005          0.0.0.0:0              LISTENING       9999
  UDP    0.0.0.0:5005           *:*                                    1111
";
        assert_eq!(parse_netstat_pids(output, 5005), vec![4242]);
        assert!(parse_netstat_pids(output, 6000).is_empty());
    }

    #[test]
    fn test_parse_lsof_pids() {
        assert_eq!(parse_lsof_pids("4242\n 17 \n\nnot-a-pid\n"), vec![4242, 17]);
    }

    #[test]
    fn test_is_service_command() {
        let stem = "video-mcp-server";
        assert!(is_service_command(&["/usr/local/bin/video-mcp-server", "start", "--port", "5005"], stem));
        assert!(is_service_command(&["video-mcp-server.exe", "--json", "start"], stem));
        assert!(!is_service_command(&["/usr/local/bin/video-mcp-server", "stop"], stem));
        assert!(!is_service_command(&["python", "video-mcp-server", "start"], stem));
        assert!(!is_service_command::<&str>(&[], stem));
    }
}
