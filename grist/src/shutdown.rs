//! Cooperative shutdown signalling for a running worker.
//!
//! A [`Trigger`]/[`Signal`] pair lets any task — a Ctrl-C handler, a
//! supervisor, a test — stop a worker cleanly. The worker only observes the
//! signal between protocol operations, so stopping never interrupts a send
//! or leaves a partial frame on the wire.

use tokio::sync::watch;

/// Creates a linked trigger/signal pair.
pub fn channel() -> (Trigger, Signal) {
    let (tx, rx) = watch::channel(false);
    (Trigger { tx }, Signal { rx })
}

/// Fires the shutdown request. Cloneable; any holder may fire it, and
/// firing more than once is harmless.
#[derive(Debug, Clone)]
pub struct Trigger {
    /// Shared flag, flipped once.
    tx: watch::Sender<bool>,
}

impl Trigger {
    /// Requests that the worker stop after its current operation.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The worker-side receiver of a shutdown request.
#[derive(Debug, Clone)]
pub struct Signal {
    /// Shared flag watched by the dispatch loop.
    rx: watch::Receiver<bool>,
}

impl Signal {
    /// A signal that can never fire, for workers that only stop on
    /// transport errors.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Resolves once shutdown has been requested.
    pub(crate) async fn fired(&mut self) {
        if self.rx.wait_for(|fired| *fired).await.is_err() {
            // Trigger dropped without firing: this signal can never fire.
            std::future::pending::<()>().await;
        }
    }

    /// Whether shutdown has already been requested.
    pub(crate) fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }
}
