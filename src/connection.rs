//! Connection aggregate: driver loop, outbound staging, and teardown.
//!
//! One [`Connection`] owns everything scoped to a single transport stream:
//! the read and write pipelines, the handler registry, the dispatcher, and
//! the close state machine. A dedicated driver task runs the read loop and
//! the periodic flush; any number of tasks may stage outbound packets.

use std::{
    any::Any,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::FutureExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    config::ConnectionConfig,
    dispatch::Dispatcher,
    error::{ConnectionError, Result},
    frame::FrameError,
    handler::{HandlerId, HandlerRegistry, PacketHandler},
    packet::{Packet, PacketRegistry},
    read::ReadPipeline,
    wire::{Wire, WireReader},
    write::WritePipeline,
};

/// A connection-scoped endpoint for the batched packet protocol.
///
/// Created on stream acceptance via [`Connection::open`]; destroyed via the
/// idempotent [`Connection::close`], which releases every owned resource
/// and closes each registered handler exactly once.
pub struct Connection {
    peer_addr: SocketAddr,
    config: ConnectionConfig,
    packets: Arc<PacketRegistry>,
    connected: AtomicBool,
    authenticated: AtomicBool,
    writer: tokio::sync::Mutex<WritePipeline>,
    handlers: Arc<HandlerRegistry>,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    close_latch: AtomicBool,
}

impl Connection {
    /// Take ownership of an accepted stream and spawn its driver task.
    pub fn open<S>(
        stream: S,
        peer_addr: SocketAddr,
        config: ConnectionConfig,
        packets: Arc<PacketRegistry>,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let handlers = Arc::new(HandlerRegistry::new());
        let connection = Arc::new(Self {
            peer_addr,
            config,
            packets,
            connected: AtomicBool::new(true),
            authenticated: AtomicBool::new(false),
            writer: tokio::sync::Mutex::new(WritePipeline::new(
                Box::new(write_half),
                config.compression_level,
            )),
            dispatcher: Dispatcher::new(Arc::clone(&handlers), config.deferred_capacity),
            handlers,
            shutdown: CancellationToken::new(),
            close_latch: AtomicBool::new(false),
        });

        let pipeline = ReadPipeline::new(
            Box::new(read_half),
            config.max_batch_bytes,
            config.max_decoded_bytes,
        );
        tokio::spawn(drive(Arc::clone(&connection), pipeline));
        connection
    }

    /// Network address of the peer.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr { self.peer_addr }

    /// Whether the connection is still live.
    #[must_use]
    pub fn connected(&self) -> bool { self.connected.load(Ordering::SeqCst) }

    /// Whether the peer has authenticated.
    #[must_use]
    pub fn authenticated(&self) -> bool { self.authenticated.load(Ordering::SeqCst) }

    /// Flip the authentication gate.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// Stage one packet into the current outbound batch.
    ///
    /// The packet is written out on the next periodic (or explicit) flush.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] on a dead connection,
    /// [`ConnectionError::WriterUnavailable`] if the transport writer is
    /// gone, or the marshal failure that rolled the stage back.
    pub async fn stage(&self, packet: &mut dyn Packet) -> Result<()> {
        if !self.connected() {
            return Err(ConnectionError::NotConnected);
        }
        let id = packet.id();
        let mut writer = self.writer.lock().await;
        let result = writer.stage(packet);
        if let Err(ConnectionError::Panic(message)) = &result {
            error!(
                addr = %self.peer_addr,
                packet_id = id,
                %message,
                "panicked while staging packet"
            );
        }
        result
    }

    /// Write every staged packet to the transport as one compressed batch.
    ///
    /// Invoked by the driver every flush interval; also available to
    /// callers that cannot wait for the timer. Never auto-retried.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] on a dead or closing
    /// connection; an I/O failure marks the connection disconnected and
    /// propagates.
    pub async fn flush(&self) -> Result<()> {
        if !self.connected() {
            return Err(ConnectionError::NotConnected);
        }
        let mut writer = self.writer.lock().await;
        // Teardown must not wait behind a transport write stalled on a dead
        // peer: a close abandons the write here, releasing the writer lock,
        // and shuts the stream down right after.
        let result = tokio::select! {
            biased;

            () = self.shutdown.cancelled() => Err(ConnectionError::NotConnected),
            result = writer.flush() => result,
        };
        if matches!(&result, Err(ConnectionError::Io(_))) {
            log::warn!(
                "flush to {} failed; marking connection disconnected",
                self.peer_addr
            );
            self.connected.store(false, Ordering::SeqCst);
        }
        result
    }

    /// Number of packets staged and not yet flushed.
    pub async fn pending_packets(&self) -> u64 { self.writer.lock().await.pending() }

    /// Register a handler, returning the id it can later be removed by.
    pub async fn register_handler(&self, handler: Box<dyn PacketHandler>) -> HandlerId {
        self.handlers.register(handler).await
    }

    /// Register several handlers in order.
    pub async fn register_handlers(
        &self,
        handlers: Vec<Box<dyn PacketHandler>>,
    ) -> Vec<HandlerId> {
        let mut ids = Vec::with_capacity(handlers.len());
        for handler in handlers {
            ids.push(self.handlers.register(handler).await);
        }
        ids
    }

    /// Unregister and close the handler under `id`.
    ///
    /// Must not be called from inside a handler's own `receive`; return
    /// [`Disposition::Unregister`](crate::handler::Disposition::Unregister)
    /// there instead.
    pub async fn unregister_handler(&self, id: HandlerId) -> bool {
        self.handlers.unregister(id).await
    }

    /// Point-in-time copy of the registered handlers.
    pub async fn handler_snapshot(&self) -> Vec<(HandlerId, Arc<dyn PacketHandler>)> {
        self.handlers.snapshot().await
    }

    /// Tear the connection down.
    ///
    /// Safe to call any number of times from any task; the body runs
    /// exactly once no matter how many triggers (driver I/O failure, flush
    /// failure, external request) race. `reason` is logged when present.
    pub async fn close(&self, reason: Option<ConnectionError>) {
        if self.close_latch.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(error) = &reason {
            error!(addr = %self.peer_addr, %error, "connection closed");
        }

        self.connected.store(false, Ordering::SeqCst);
        // Wake the driver and unblock a push into a full deferred queue
        // before touching locks it might hold.
        self.shutdown.cancel();
        self.dispatcher.close().await;

        // The outbound compressor dies with the write pipeline; shutting
        // the writer down flushes nothing further by design.
        let transport = self.writer.lock().await.take_transport();
        if let Some(mut transport) = transport {
            if let Err(error) = transport.shutdown().await {
                debug!(addr = %self.peer_addr, %error, "transport shutdown failed");
            }
        }

        self.handlers.close_all().await;
        debug!(addr = %self.peer_addr, "connection torn down");
    }

    pub(crate) fn close_requested(&self) -> bool { self.shutdown.is_cancelled() }
}

/// Render a caught panic payload for logging.
pub(crate) fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else {
        String::from("non-string panic payload")
    }
}

/// Driver task body: runs the loop, then converges every exit path onto the
/// single idempotent close. Panics are caught here so a broken handler or
/// codec can never take the process down.
async fn drive(connection: Arc<Connection>, mut pipeline: ReadPipeline) {
    let outcome = std::panic::AssertUnwindSafe(run(&connection, &mut pipeline))
        .catch_unwind()
        .await;
    let reason = match outcome {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(payload) => Some(ConnectionError::Panic(describe_panic(&payload))),
    };
    connection.close(reason).await;
}

/// The single per-connection loop. Each iteration prioritizes, in order:
/// the close signal, the periodic flush timer, then one read step. A
/// completed batch is decoded and dispatched without yielding to another
/// batch, so a slow handler stalls further reads by design.
async fn run(connection: &Arc<Connection>, pipeline: &mut ReadPipeline) -> Result<()> {
    let mut ticker = tokio::time::interval(connection.config.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            () = connection.shutdown.cancelled() => return Ok(()),

            _ = ticker.tick() => {
                match connection.flush().await {
                    Ok(()) => {}
                    // A close racing the timer is a shutdown, not a failure.
                    Err(error) if error.is_caller_error() => return Ok(()),
                    Err(error) => return Err(error),
                }
            }

            result = pipeline.next_batch() => {
                let count = result?;
                dispatch_batch(connection, pipeline.staging(), count).await?;
            }
        }
    }
}

/// Decode `count` packets out of one decompressed batch and dispatch each
/// immediately; the first failure aborts the remainder.
async fn dispatch_batch(connection: &Arc<Connection>, staging: &[u8], count: u64) -> Result<()> {
    let mut reader = WireReader::new(staging);
    for _ in 0..count {
        let mut id = 0u32;
        reader.u32(&mut id)?;
        let Some(mut packet) = connection.packets.find(id) else {
            return Err(ConnectionError::UnknownPacketType(id));
        };
        packet.marshal(&mut reader)?;

        // Skip the handler chain once teardown has begun.
        if connection.close_requested() {
            return Ok(());
        }
        connection.dispatcher.dispatch(packet).await?;
    }
    if reader.remaining() != 0 {
        return Err(FrameError::TrailingBytes(reader.remaining()).into());
    }
    Ok(())
}
