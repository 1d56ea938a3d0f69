//! Outbound packet staging and batch flushing.

use std::panic::AssertUnwindSafe;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::{
    compress::BatchCompressor,
    error::{ConnectionError, Result},
    frame::FrameHeader,
    packet::Packet,
    wire::{Wire, WireWriter},
};

/// Boxed write half of the connection's transport.
pub(crate) type TransportWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Stages outgoing packets into one buffer and flushes them as a single
/// compressed batch.
///
/// The pipeline lives behind the connection's write mutex: `stage` and
/// `flush` are serialized against each other so the buffer and the pending
/// counter never interleave partially.
pub(crate) struct WritePipeline {
    transport: Option<TransportWriter>,
    buf: BytesMut,
    pending: u64,
    compressor: BatchCompressor,
    compressed: Vec<u8>,
}

impl WritePipeline {
    pub(crate) fn new(transport: TransportWriter, compression_level: u32) -> Self {
        Self {
            transport: Some(transport),
            buf: BytesMut::with_capacity(64 * 1024),
            pending: 0,
            compressor: BatchCompressor::new(compression_level),
            compressed: Vec::new(),
        }
    }

    /// Marshal one packet (4-byte LE id, then its fields) into the batch
    /// buffer. A marshal failure or panic rolls the buffer back so a
    /// half-encoded packet can never reach the wire.
    pub(crate) fn stage(&mut self, packet: &mut dyn Packet) -> Result<()> {
        if self.transport.is_none() {
            return Err(ConnectionError::WriterUnavailable);
        }

        let rollback = self.buf.len();
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mut writer = WireWriter::new(&mut self.buf);
            let mut id = packet.id();
            writer.u32(&mut id)?;
            packet.marshal(&mut writer)
        }));
        match outcome {
            Ok(Ok(())) => {
                self.pending += 1;
                Ok(())
            }
            Ok(Err(error)) => {
                self.buf.truncate(rollback);
                Err(error.into())
            }
            Err(payload) => {
                self.buf.truncate(rollback);
                Err(ConnectionError::Panic(crate::connection::describe_panic(
                    &payload,
                )))
            }
        }
    }

    /// Compress and write every staged packet as one batch.
    ///
    /// No-op at zero pending packets. The compressor is sync-flushed so the
    /// peer can decode the batch without waiting for more data, and the
    /// transport is flushed before the buffer resets.
    pub(crate) async fn flush(&mut self) -> Result<()> {
        if self.pending == 0 {
            return Ok(());
        }
        let transport = self
            .transport
            .as_mut()
            .ok_or(ConnectionError::WriterUnavailable)?;

        self.compressed.clear();
        self.compressor.compress(&self.buf, &mut self.compressed)?;
        let length = u32::try_from(self.compressed.len()).map_err(|_| {
            ConnectionError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "compressed batch exceeds header length field",
            ))
        })?;

        let header = FrameHeader::new(length, self.pending).encode();
        transport.write_all(&header).await?;
        transport.write_all(&self.compressed).await?;
        transport.flush().await?;
        trace!(
            packets = self.pending,
            decoded = self.buf.len(),
            compressed = self.compressed.len(),
            "batch flushed"
        );

        self.buf.clear();
        self.pending = 0;
        Ok(())
    }

    /// Number of packets staged since the last flush.
    pub(crate) fn pending(&self) -> u64 { self.pending }

    /// Detach the transport writer for shutdown during close.
    pub(crate) fn take_transport(&mut self) -> Option<TransportWriter> { self.transport.take() }
}
