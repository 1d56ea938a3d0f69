//! Holding area for packets decoded before any handler exists.

use tokio::sync::{
    Mutex,
    mpsc::{self, error::TryRecvError},
};

use crate::packet::Packet;

/// Bounded FIFO of packets awaiting the first handler registration.
///
/// Pushing into a full queue awaits — the producer is the connection's
/// driver, so a stalled consumer exerts backpressure on the read pipeline
/// instead of growing memory without bound.
pub(crate) struct DeferredQueue {
    tx: mpsc::Sender<Box<dyn Packet>>,
    rx: Mutex<mpsc::Receiver<Box<dyn Packet>>>,
}

/// Error returned when pushing onto a closed queue.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct DeferredClosed;

impl DeferredQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        // mpsc::channel panics on a zero capacity.
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Queue a packet, awaiting if the queue is full.
    pub(crate) async fn push(&self, packet: Box<dyn Packet>) -> Result<(), DeferredClosed> {
        self.tx.send(packet).await.map_err(|_| DeferredClosed)
    }

    /// Take the next queued packet without waiting.
    pub(crate) async fn pop(&self) -> Option<Box<dyn Packet>> {
        match self.rx.lock().await.try_recv() {
            Ok(packet) => Some(packet),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Close the queue: subsequent pushes fail and an awaiting producer is
    /// unblocked. Already-queued packets remain poppable until dropped.
    pub(crate) async fn close(&self) { self.rx.lock().await.close(); }
}
