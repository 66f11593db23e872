//! Periodic liveness frames, independent of job traffic.

use std::time::Duration;

use tokio::io::AsyncWrite;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::session::Outbound;

/// Emits one heartbeat per `period` until `stop` fires or a send fails.
///
/// The send sits outside the `select!`, so a stop signal can never abandon
/// a frame mid-write; an in-flight heartbeat completes or fails like any
/// other session operation, and the worst case at shutdown is one extra
/// heartbeat on the wire.
///
/// A failed send only ends the ticker — the dispatch loop owns surfacing
/// the transport error to the caller.
pub(crate) async fn run<W>(outbound: Outbound<W>, period: Duration, mut stop: watch::Receiver<bool>)
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = time::interval(period);
    // A slow write must not be followed by a burst of make-up ticks.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the first heartbeat belongs one
    // full period after the hello.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        if *stop.borrow() {
            break;
        }
        if let Err(error) = outbound.send_heartbeat().await {
            tracing::warn!(%error, "heartbeat send failed; ticker stopping");
            break;
        }
        tracing::trace!("heartbeat sent");
    }
}
