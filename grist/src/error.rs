//! Error types for worker sessions.

use grist_proto::{FrameKind, WireError};

/// Alias for `Result<T, grist::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by [`Worker::run`](crate::Worker::run).
///
/// None of these are retried internally: the engine has no reconnection or
/// backoff policy, so every failure ends the session and reaches the caller.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The transport could not be established.
    #[error("failed to connect to {addr}")]
    Connect {
        /// Server address the worker tried to reach.
        addr: String,
        /// Underlying connect failure.
        #[source]
        source: std::io::Error,
    },

    /// The connection ended during a send or receive.
    #[error("transport closed")]
    Closed,

    /// A received frame could not be decoded. Fatal to the session: once one
    /// frame fails to decode, later frame boundaries cannot be trusted.
    #[error("malformed frame")]
    Malformed(#[from] WireError),

    /// The server sent a frame kind the worker never expects. Only job
    /// frames flow server-to-worker in this protocol.
    #[error("unexpected {0} frame from server")]
    UnexpectedFrame(FrameKind),

    /// Any other transport-level I/O failure during a send or receive.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
