//! Per-session output queue.
//!
//! Every session gets a bounded queue drained by its own writer task, so a
//! stalled client only ever fills its own queue. A full queue on a broadcast
//! counts as a dead client: we raise its disconnect flag and move on.

use std::fmt;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tracing::warn;

pub const DEFAULT_CAPACITY: usize = 128;

/// The writer side of a session has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxClosed;

impl fmt::Display for OutboxClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("session output closed")
    }
}

impl std::error::Error for OutboxClosed {}

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Bytes>,
    disconnect: watch::Sender<bool>,
}

impl Outbox {
    /// A new outbox plus the receiver its writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (disconnect, _) = watch::channel(false);
        (Self { tx, disconnect }, rx)
    }

    /// Queue text for this session, waiting for room if the queue is full.
    ///
    /// Used for a session's own responses: only the session that produced
    /// the text waits. A kick, before or during the wait, fails the send.
    pub async fn send(&self, text: impl Into<Bytes>) -> Result<(), OutboxClosed> {
        let text = text.into();
        let mut kicked = self.disconnect.subscribe();
        if *kicked.borrow_and_update() {
            return Err(OutboxClosed);
        }
        tokio::select! {
            r = self.tx.send(text) => r.map_err(|_| OutboxClosed),
            _ = async { kicked.wait_for(|k| *k).await.map(|_| ()) } => Err(OutboxClosed),
        }
    }

    /// Queue text without waiting. Returns whether it was queued.
    ///
    /// A full queue asks the session to disconnect.
    pub fn offer(&self, text: Bytes) -> bool {
        match self.tx.try_send(text) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("output queue full; disconnecting slow client");
                self.kick();
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Ask the owning session to end.
    pub fn kick(&self) {
        self.disconnect.send_replace(true);
    }

    pub fn is_kicked(&self) -> bool {
        *self.disconnect.borrow()
    }

    /// Watch for `kick`.
    pub fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnect.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Writer task body: copy queued text to `wr` until every `Outbox` clone is
/// dropped, then shut the write side down.
pub async fn pump<W>(mut rx: mpsc::Receiver<Bytes>, mut wr: W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(b) = rx.recv().await {
        if let Err(e) = wr.write_all(&b).await {
            rx.close();
            return Err(e);
        }
    }
    wr.shutdown().await
}
