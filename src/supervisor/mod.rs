//! Service lifecycle: start the embedded MCP service in the background,
//! observe it, and stop it from this or any other process.
//!
//! - `supervisor`: the owning side (worker thread, readiness, in-process stop)
//! - `control`: `SHUTDOWN`/`OK` listener on `port + 1` and its client
//! - `shutdown`: ordered out-of-process strategies and the re-probe loop
//! - `process`: OS process discovery and signalling
//! - `probe`: TCP liveness probe

pub mod control;
pub mod errors;
pub mod probe;
pub mod process;
pub mod shutdown;
#[allow(clippy::module_inception)]
pub mod supervisor;

pub use errors::SupervisorError;
pub use probe::is_port_in_use;
pub use shutdown::{ShutdownStrategy, StrategyOutcome};
pub use supervisor::Supervisor;
