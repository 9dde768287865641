//! Supervisor error types.
//!
//! These never cross the public `start`/`stop` boundary (which report
//! `bool`); they carry detail into the logs.

use thiserror::Error;

/// Errors raised while starting or tearing down the supervised service.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn worker thread: {reason}")]
    WorkerSpawn { reason: String },

    /// The worker's event loop could not be built.
    #[error("failed to build event loop: {reason}")]
    Runtime { reason: String },

    /// A listener could not bind its address.
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// The MCP handler could not be constructed.
    #[error("failed to build MCP handler: {reason}")]
    Handler { reason: String },

    /// The serve loop ended with an error.
    #[error("service loop failed: {reason}")]
    Serve { reason: String },
}
