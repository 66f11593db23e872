//! Protocol session: one live connection and the four protocol operations.

use std::sync::Arc;

use grist_proto::{Frame, Hello, Job, JobResult};
use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::transport;

/// Binds the wire codec to one live connection.
///
/// Reads are performed only through the session itself (only the dispatch
/// loop receives); writes go through a shared [`Outbound`] handle so the
/// heartbeat ticker and the dispatch loop serialize against each other.
///
/// The session validates nothing about call order: sending the hello first
/// and echoing the right job id in each result are caller obligations.
#[derive(Debug)]
pub(crate) struct Session<R, W> {
    /// Read half. Exclusively owned: receiving is single-consumer.
    reader: BufReader<R>,
    /// Shared write half.
    outbound: Outbound<W>,
    /// Handshake record this session announces.
    hello: Hello,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wraps the two halves of an established connection.
    pub(crate) fn new(reader: R, writer: W, hello: Hello) -> Self {
        Self {
            reader: BufReader::new(reader),
            outbound: Outbound::new(writer),
            hello,
        }
    }

    /// A write handle for concurrent senders (the heartbeat ticker).
    pub(crate) fn outbound(&self) -> Outbound<W> {
        self.outbound.clone()
    }

    /// Sends the handshake frame.
    ///
    /// Must be queued before any other frame on this session, and at most
    /// once; no acknowledgment is awaited.
    pub(crate) async fn send_hello(&self) -> Result<()> {
        self.outbound.send(&Frame::Hello(self.hello)).await
    }

    /// Blocks until the next frame arrives and decodes it as a job.
    pub(crate) async fn recv_job(&mut self) -> Result<Job> {
        let bytes = transport::recv_frame(&mut self.reader).await?;
        match Frame::decode(&bytes)? {
            Frame::Job(job) => Ok(job),
            other => Err(Error::UnexpectedFrame(other.kind())),
        }
    }

    /// Sends the scalar answer for one job. `id` must equal the `id` of the
    /// job being answered.
    pub(crate) async fn send_result(&self, id: u32, value: f64) -> Result<()> {
        self.outbound
            .send(&Frame::Result(JobResult { id, value }))
            .await
    }
}

/// Cloneable write handle over the connection's write half.
///
/// All clones share one lock, and a frame is written and flushed in full
/// while the lock is held — two producers can never interleave bytes on the
/// wire, and a frame is never left half-written.
#[derive(Debug)]
pub(crate) struct Outbound<W> {
    /// Shared, serialized write half.
    writer: Arc<Mutex<BufWriter<W>>>,
}

impl<W> Clone for Outbound<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl<W> Outbound<W>
where
    W: AsyncWrite + Unpin,
{
    /// Wraps a write half.
    fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(BufWriter::new(writer))),
        }
    }

    /// Encodes `frame` and writes it as one transport frame.
    pub(crate) async fn send(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();
        let mut writer = self.writer.lock().await;
        transport::send_frame(&mut *writer, &bytes).await
    }

    /// Sends one zero-payload liveness frame.
    pub(crate) async fn send_heartbeat(&self) -> Result<()> {
        self.send(&Frame::Heartbeat).await
    }
}
