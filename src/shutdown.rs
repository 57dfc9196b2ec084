//! Shutdown escalation channel.
//!
//! A handler deep in the chain that finds the process in an unusable state
//! returns [`Error::Shutdown`](crate::Error::Shutdown). The pipeline turns
//! that into a [`Signal`] on this channel and the server, which owns the
//! receiving end, stops accepting and drains.
//!
//! The channel holds one pending signal. Sending never waits: if a shutdown
//! is already pending the extra signal is dropped, which is fine because only
//! the intent to shut down has to arrive.

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

/// Why the process is going down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signal {
    /// The pipeline found an integrity violation.
    Terminate,
}

/// Sending half, cloned into every [`App`](crate::App) that may escalate.
#[derive(Clone, Debug)]
pub struct ShutdownSender {
    tx: mpsc::Sender<Signal>,
}

/// Receiving half, handed to [`Server::serve_with_shutdown`](crate::Server::serve_with_shutdown).
#[derive(Debug)]
pub struct ShutdownReceiver {
    rx: mpsc::Receiver<Signal>,
}

/// Creates the process-wide shutdown channel.
pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (ShutdownSender { tx }, ShutdownReceiver { rx })
}

impl ShutdownSender {
    /// Requests shutdown without blocking.
    ///
    /// Returns `true` if the signal was queued, `false` if one was already
    /// pending or nobody is listening anymore.
    pub fn signal(&self, signal: Signal) -> bool {
        match self.tx.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Closed(_)) => {
                warn!(?signal, "shutdown requested but no listener is attached");
                false
            }
        }
    }
}

impl ShutdownReceiver {
    /// Waits for the next signal. Resolves to `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Signal> {
        self.rx.recv().await
    }

    /// Non-blocking check for a pending signal.
    pub fn try_recv(&mut self) -> Option<Signal> {
        self.rx.try_recv().ok()
    }
}
