//! Worker entry point and dispatch loop.

use std::ops::RangeInclusive;
use std::time::Duration;

use grist_proto::{Hello, PROTOCOL_VERSION};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;

use crate::error::Result;
use crate::heartbeat;
use crate::session::Session;
use crate::shutdown::Signal;
use crate::transport;

/// Configures a [`Worker`].
///
/// Defaults match the reference protocol behavior: version
/// [`PROTOCOL_VERSION`], the catch-all job-type range `0..=0`, a one-second
/// heartbeat, and no shutdown signal.
#[derive(Debug, Clone)]
pub struct WorkerBuilder {
    /// Server address, e.g. `127.0.0.1:5555`.
    addr: String,
    /// Period between liveness frames.
    heartbeat: Duration,
    /// Wire format version to advertise.
    version: u8,
    /// Inclusive job-type range to advertise.
    job_types: RangeInclusive<u32>,
    /// Stop request observed between protocol operations.
    shutdown: Signal,
}

impl WorkerBuilder {
    /// Period between heartbeat frames. A zero period disables the ticker
    /// entirely, for servers that do not track worker liveness.
    pub fn heartbeat_interval(mut self, period: Duration) -> Self {
        self.heartbeat = period;
        self
    }

    /// Wire format version advertised in the hello. Overridable so protocol
    /// revisions can be exercised side by side; defaults to
    /// [`PROTOCOL_VERSION`].
    pub fn protocol_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Inclusive range of job types this worker accepts.
    pub fn job_types(mut self, range: RangeInclusive<u32>) -> Self {
        self.job_types = range;
        self
    }

    /// Signal that stops the worker after its current operation completes.
    pub fn shutdown(mut self, signal: Signal) -> Self {
        self.shutdown = signal;
        self
    }

    /// Finalizes the configuration.
    pub fn build(self) -> Worker {
        Worker {
            addr: self.addr,
            heartbeat: self.heartbeat,
            version: self.version,
            job_types: self.job_types,
            shutdown: self.shutdown,
        }
    }
}

/// A worker endpoint: one server connection, one objective function, one
/// job at a time.
#[derive(Debug)]
pub struct Worker {
    /// Server address.
    addr: String,
    /// Period between liveness frames; zero disables the ticker.
    heartbeat: Duration,
    /// Wire format version to advertise.
    version: u8,
    /// Inclusive job-type range to advertise.
    job_types: RangeInclusive<u32>,
    /// Stop request observed between protocol operations.
    shutdown: Signal,
}

impl Worker {
    /// Starts configuring a worker for the given server address.
    pub fn builder(addr: impl Into<String>) -> WorkerBuilder {
        WorkerBuilder {
            addr: addr.into(),
            heartbeat: Duration::from_secs(1),
            version: PROTOCOL_VERSION,
            job_types: 0..=0,
            shutdown: Signal::never(),
        }
    }

    /// Connects to the server and runs the engine until shutdown or a fatal
    /// transport error. Blocks its caller for the life of the session.
    ///
    /// The objective is invoked synchronously on the dispatch task, at most
    /// once per received job. The engine enforces no timeout on it: an
    /// objective that hangs stalls the whole worker, heartbeats included,
    /// so bounding its running time is the embedding application's
    /// contract.
    pub async fn run<F>(self, objective: F) -> Result<()>
    where
        F: FnMut(u32, &[f64]) -> f64,
    {
        let stream = transport::connect(&self.addr).await?;
        tracing::info!(addr = %self.addr, "connected to server");
        self.run_on(stream, objective).await
    }

    /// Runs the engine over an already-established duplex stream.
    ///
    /// This is [`run`](Self::run) minus the TCP connect, for embedders that
    /// bring their own transport (vsock, unix sockets, an in-memory pair in
    /// tests). The configured address is ignored.
    pub async fn run_on<S, F>(mut self, stream: S, mut objective: F) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
        F: FnMut(u32, &[f64]) -> f64,
    {
        let (reader, writer) = tokio::io::split(stream);
        let hello = Hello {
            version: self.version,
            job_type_from: *self.job_types.start(),
            job_type_to: *self.job_types.end(),
        };
        let mut session = Session::new(reader, writer, hello);

        // The hello must be the first frame queued on the session; the
        // ticker does not exist yet, so nothing can race it onto the wire.
        session.send_hello().await?;
        tracing::info!(
            version = hello.version,
            job_type_from = hello.job_type_from,
            job_type_to = hello.job_type_to,
            "hello sent"
        );

        // The ticker gets its own stop channel so every exit path below can
        // halt it and wait it out before the connection drops.
        let (stop_tx, stop_rx) = watch::channel(false);
        let ticker = (self.heartbeat > Duration::ZERO).then(|| {
            tokio::spawn(heartbeat::run(
                session.outbound(),
                self.heartbeat,
                stop_rx,
            ))
        });

        let outcome = dispatch(&mut session, &mut self.shutdown, &mut objective).await;

        let _ = stop_tx.send(true);
        if let Some(ticker) = ticker {
            // An in-flight heartbeat finishes before the transport is
            // released.
            let _ = ticker.await;
        }

        if let Err(ref error) = outcome {
            tracing::warn!(%error, "worker session ended");
        }
        outcome
    }
}

/// Receive a job, evaluate it, answer it — forever.
///
/// Returns `Ok(())` only on shutdown. The shutdown signal is observed
/// between operations and while a receive is pending, never mid-send:
/// abandoning a blocked receive is safe, abandoning a write is not.
async fn dispatch<R, W, F>(
    session: &mut Session<R, W>,
    shutdown: &mut Signal,
    objective: &mut F,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(u32, &[f64]) -> f64,
{
    loop {
        if shutdown.is_fired() {
            tracing::info!("shutdown requested; stopping worker");
            return Ok(());
        }

        let job = tokio::select! {
            job = session.recv_job() => job?,
            () = shutdown.fired() => {
                tracing::info!("shutdown requested while awaiting a job; stopping worker");
                return Ok(());
            }
        };

        tracing::debug!(
            id = job.id,
            job_type = job.job_type,
            len = job.payload.len(),
            "job received"
        );
        let value = objective(job.job_type, &job.payload);
        session.send_result(job.id, value).await?;
        tracing::debug!(id = job.id, value, "result sent");
    }
}

#[cfg(test)]
mod tests {
    use grist_proto::{Frame, FrameKind, Job, JobResult};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    use super::*;
    use crate::error::Error;
    use crate::shutdown;

    /// Server end of an in-memory session.
    struct Peer {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
    }

    impl Peer {
        async fn recv(&mut self) -> Frame {
            let bytes = transport::recv_frame(&mut self.reader).await.unwrap();
            Frame::decode(&bytes).unwrap()
        }

        async fn send(&mut self, frame: &Frame) {
            transport::send_frame(&mut self.writer, &frame.encode())
                .await
                .unwrap();
        }

        async fn send_job(&mut self, id: u32, job_type: u32, payload: Vec<f64>) {
            self.send(&Frame::Job(Job {
                id,
                job_type,
                payload,
            }))
            .await;
        }

        /// Reads frames, dropping heartbeats, until a non-heartbeat frame
        /// arrives.
        async fn recv_skipping_heartbeats(&mut self) -> Frame {
            loop {
                match self.recv().await {
                    Frame::Heartbeat => {}
                    other => return other,
                }
            }
        }
    }

    fn spawn_worker<F>(builder: WorkerBuilder, objective: F) -> (JoinHandle<Result<()>>, Peer)
    where
        F: FnMut(u32, &[f64]) -> f64 + Send + 'static,
    {
        let (near, far) = tokio::io::duplex(64 * 1024);
        let handle = tokio::spawn(builder.build().run_on(near, objective));
        let (reader, writer) = tokio::io::split(far);
        (handle, Peer { reader, writer })
    }

    fn quiet_builder() -> WorkerBuilder {
        // The address is unused by run_on; heartbeats off unless a test
        // wants them.
        Worker::builder("unused:0").heartbeat_interval(Duration::ZERO)
    }

    #[tokio::test]
    async fn hello_is_the_first_frame_on_the_wire() {
        let (handle, mut peer) = spawn_worker(
            quiet_builder().heartbeat_interval(Duration::from_millis(1)),
            |_, _| 0.0,
        );

        assert_eq!(
            peer.recv().await,
            Frame::Hello(Hello {
                version: PROTOCOL_VERSION,
                job_type_from: 0,
                job_type_to: 0,
            })
        );

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn hello_reflects_builder_overrides() {
        let (handle, mut peer) = spawn_worker(
            quiet_builder().protocol_version(7).job_types(2..=5),
            |_, _| 0.0,
        );

        assert_eq!(
            peer.recv().await,
            Frame::Hello(Hello {
                version: 7,
                job_type_from: 2,
                job_type_to: 5,
            })
        );

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn sums_a_payload_end_to_end() {
        let (handle, mut peer) =
            spawn_worker(quiet_builder(), |_, xs| xs.iter().sum());

        peer.recv().await; // hello
        peer.send_job(7, 0, vec![1.5, 2.5]).await;
        assert_eq!(
            peer.recv().await,
            Frame::Result(JobResult { id: 7, value: 4.0 })
        );

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn answers_an_empty_payload() {
        let (handle, mut peer) = spawn_worker(quiet_builder(), |_, _| 0.0);

        peer.recv().await; // hello
        peer.send_job(1, 0, vec![]).await;
        assert_eq!(
            peer.recv().await,
            Frame::Result(JobResult { id: 1, value: 0.0 })
        );

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn results_keep_job_order_and_ids() {
        let (handle, mut peer) =
            spawn_worker(quiet_builder(), |_, xs| xs[0] * 3.0);

        peer.recv().await; // hello
        for id in 0..10u32 {
            peer.send_job(id, 0, vec![f64::from(id)]).await;
        }
        for id in 0..10u32 {
            assert_eq!(
                peer.recv().await,
                Frame::Result(JobResult {
                    id,
                    value: f64::from(id) * 3.0,
                })
            );
        }

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn job_type_reaches_the_objective() {
        let (handle, mut peer) = spawn_worker(quiet_builder(), |job_type, _| {
            f64::from(job_type) + 0.5
        });

        peer.recv().await; // hello
        peer.send_job(3, 42, vec![]).await;
        assert_eq!(
            peer.recv().await,
            Frame::Result(JobResult {
                id: 3,
                value: 42.5,
            })
        );

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_flow_while_idle() {
        let (handle, mut peer) = spawn_worker(
            quiet_builder().heartbeat_interval(Duration::from_secs(1)),
            |_, _| 0.0,
        );

        peer.recv().await; // hello
        for _ in 0..3 {
            assert_eq!(peer.recv().await, Frame::Heartbeat);
        }

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_interleave_with_job_traffic_intact() {
        let (handle, mut peer) = spawn_worker(
            quiet_builder().heartbeat_interval(Duration::from_secs(1)),
            |_, xs| xs.iter().sum(),
        );

        peer.recv().await; // hello

        let mut heartbeats = 0u32;
        for id in 0..5u32 {
            peer.send_job(id, 0, vec![f64::from(id), 1.0]).await;
            // Let a couple of ticker periods elapse around each job.
            tokio::time::sleep(Duration::from_millis(2500)).await;

            loop {
                // Every frame must decode cleanly; interleaved writes would
                // corrupt the stream and fail here.
                match peer.recv().await {
                    Frame::Heartbeat => heartbeats += 1,
                    Frame::Result(result) => {
                        assert_eq!(result.id, id);
                        assert_eq!(result.value, f64::from(id) + 1.0);
                        break;
                    }
                    other => panic!("unexpected frame: {other:?}"),
                }
            }
        }
        assert!(heartbeats > 0, "ticker never fired during job traffic");

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn malformed_frame_is_fatal() {
        let (handle, mut peer) = spawn_worker(quiet_builder(), |_, _| 0.0);

        peer.recv().await; // hello
        transport::send_frame(&mut peer.writer, &[0x09])
            .await
            .unwrap();

        assert!(matches!(handle.await.unwrap(), Err(Error::Malformed(_))));
    }

    #[tokio::test]
    async fn ragged_job_payload_is_fatal() {
        let (handle, mut peer) = spawn_worker(quiet_builder(), |_, _| 0.0);

        peer.recv().await; // hello
        let mut bytes = Frame::Job(Job {
            id: 1,
            job_type: 0,
            payload: vec![1.0],
        })
        .encode();
        bytes.pop();
        transport::send_frame(&mut peer.writer, &bytes)
            .await
            .unwrap();

        assert!(matches!(handle.await.unwrap(), Err(Error::Malformed(_))));
    }

    #[tokio::test]
    async fn non_job_frame_is_fatal() {
        let (handle, mut peer) = spawn_worker(quiet_builder(), |_, _| 0.0);

        peer.recv().await; // hello
        peer.send(&Frame::Result(JobResult { id: 1, value: 0.0 }))
            .await;

        assert!(matches!(
            handle.await.unwrap(),
            Err(Error::UnexpectedFrame(FrameKind::Result))
        ));
    }

    #[tokio::test]
    async fn shutdown_unblocks_a_pending_receive() {
        let (trigger, signal) = shutdown::channel();
        let (handle, mut peer) = spawn_worker(quiet_builder().shutdown(signal), |_, _| 0.0);

        peer.recv().await; // hello — the worker is now blocked receiving
        trigger.shutdown();

        let outcome = timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop in time")
            .unwrap();
        assert!(outcome.is_ok());

        // The worker released the transport without leaving stray bytes.
        assert!(matches!(
            transport::recv_frame(&mut peer.reader).await,
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn shutdown_before_run_stops_immediately() {
        let (trigger, signal) = shutdown::channel();
        trigger.shutdown();

        let (handle, mut peer) = spawn_worker(quiet_builder().shutdown(signal), |_, _| 0.0);

        // The hello still goes out first; then the loop observes the signal.
        peer.recv().await;
        let outcome = timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop in time")
            .unwrap();
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn serves_a_real_tcp_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let worker = Worker::builder(addr.to_string())
            .heartbeat_interval(Duration::ZERO)
            .build();
        let handle = tokio::spawn(worker.run(|_, xs| xs.iter().sum()));

        let (stream, _) = listener.accept().await.unwrap();
        let (mut reader, mut writer) = stream.into_split();

        let hello = transport::recv_frame(&mut reader).await.unwrap();
        assert!(matches!(
            Frame::decode(&hello).unwrap(),
            Frame::Hello(_)
        ));

        let job = Frame::Job(Job {
            id: 1,
            job_type: 1,
            payload: vec![1.0, 2.0, 3.0],
        });
        transport::send_frame(&mut writer, &job.encode())
            .await
            .unwrap();

        let result = transport::recv_frame(&mut reader).await.unwrap();
        assert_eq!(
            Frame::decode(&result).unwrap(),
            Frame::Result(JobResult { id: 1, value: 6.0 })
        );

        drop(reader);
        drop(writer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }

    #[tokio::test]
    async fn refused_connection_reports_connect_error() {
        // Bind to grab a port nothing is listening on, then free it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let worker = Worker::builder(addr.to_string()).build();
        let outcome = worker.run(|_, _| 0.0).await;
        assert!(matches!(outcome, Err(Error::Connect { .. })));
    }

    #[tokio::test]
    async fn heartbeat_send_never_splits_an_adjacent_result() {
        // Flood jobs with the ticker running at the same virtual instant;
        // the peer verifies byte boundaries by decoding everything.
        let (handle, mut peer) = spawn_worker(
            quiet_builder().heartbeat_interval(Duration::from_millis(1)),
            |_, xs| xs.iter().sum(),
        );

        peer.recv().await; // hello
        for id in 0..50u32 {
            peer.send_job(id, 0, vec![0.5, 0.5]).await;
            let frame = peer.recv_skipping_heartbeats().await;
            assert_eq!(
                frame,
                Frame::Result(JobResult { id, value: 1.0 })
            );
        }

        drop(peer);
        assert!(matches!(handle.await.unwrap(), Err(Error::Closed)));
    }
}
