//! Worker-side engine for the grist distributed compute protocol.
//!
//! A grist worker holds one connection to the coordinating server. It
//! announces the range of job types it accepts, then evaluates jobs one at
//! a time: receive a numeric payload, run the caller's objective function
//! over it, send back the scalar. A heartbeat ticker shares the connection
//! so the server can tell a live-but-idle worker from a dead one.
//!
//! The only surface exposed to an embedding application is [`Worker`] (plus
//! the [`shutdown`] pair to stop it); the session, framing, and dispatch
//! machinery stay internal.
//!
//! # Quick start
//!
//! ```no_run
//! use grist::Worker;
//!
//! # async fn demo() -> grist::Result<()> {
//! let worker = Worker::builder("127.0.0.1:5555").build();
//!
//! // Takes over the calling task — only returns on shutdown or a fatal
//! // transport error.
//! worker.run(|_job_type, xs| xs.iter().sum()).await
//! # }
//! ```

mod error;
mod heartbeat;
mod session;
pub mod shutdown;
mod transport;
mod worker;

pub use error::{Error, Result};
pub use grist_proto::{Frame, FrameKind, Hello, Job, JobResult, PROTOCOL_VERSION, WireError};
pub use worker::{Worker, WorkerBuilder};
