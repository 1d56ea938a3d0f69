//! Inbound header/batch state machine.

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

use crate::{
    compress::BatchDecompressor,
    error::{ConnectionError, Result},
    frame::{FrameHeader, HEADER_SIZE},
};

/// Boxed read half of the connection's transport.
pub(crate) type TransportReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Clone, Copy, Debug)]
enum ReadState {
    /// Filling the 12-byte cleartext header.
    Header,
    /// Filling the compressed payload the last header described.
    Batch { count: u64 },
}

/// Drives `Header ⇄ Batch` reads over fixed reusable buffers.
///
/// Only the single driver task touches the pipeline. Fill progress lives in
/// the struct and every transport read is a single cancel-safe `read`, so
/// the driver's `select!` can abandon an in-flight [`next_batch`] call for
/// a timer or close wakeup without losing stream position.
///
/// [`next_batch`]: ReadPipeline::next_batch
pub(crate) struct ReadPipeline {
    transport: TransportReader,
    state: ReadState,
    raw: Vec<u8>,
    target: usize,
    filled: usize,
    decompressor: BatchDecompressor,
    staging: Vec<u8>,
    max_raw: usize,
    max_decoded: usize,
}

impl ReadPipeline {
    pub(crate) fn new(transport: TransportReader, max_raw: usize, max_decoded: usize) -> Self {
        let capacity = max_raw.max(HEADER_SIZE);
        Self {
            transport,
            state: ReadState::Header,
            raw: vec![0; capacity],
            target: HEADER_SIZE,
            filled: 0,
            decompressor: BatchDecompressor::new(),
            staging: Vec::new(),
            max_raw,
            max_decoded,
        }
    }

    /// Read until one whole batch is decompressed into the staging buffer,
    /// returning the packet count its header claimed.
    ///
    /// # Errors
    ///
    /// All failures are fatal to the connection: transport errors or EOF,
    /// invalid headers, and corrupt or oversized compressed payloads.
    pub(crate) async fn next_batch(&mut self) -> Result<u64> {
        loop {
            while self.filled < self.target {
                let n = self
                    .transport
                    .read(&mut self.raw[self.filled..self.target])
                    .await?;
                if n == 0 {
                    return Err(ConnectionError::Io(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "transport closed mid-frame",
                    )));
                }
                self.filled += n;
            }

            match self.state {
                ReadState::Header => {
                    let header = FrameHeader::decode(&self.raw[..HEADER_SIZE], self.max_raw)?;
                    trace!(length = header.length, count = header.count, "batch header");
                    self.state = ReadState::Batch {
                        count: header.count,
                    };
                    self.target = header.length as usize;
                    self.filled = 0;
                }
                ReadState::Batch { count } => {
                    self.staging.clear();
                    self.decompressor.decompress(
                        &self.raw[..self.target],
                        &mut self.staging,
                        self.max_decoded,
                    )?;
                    self.state = ReadState::Header;
                    self.target = HEADER_SIZE;
                    self.filled = 0;
                    return Ok(count);
                }
            }
        }
    }

    /// Decoded bytes of the batch returned by the last
    /// [`next_batch`](Self::next_batch) call. Invalidated the moment the
    /// next read step begins; copy anything needed longer.
    pub(crate) fn staging(&self) -> &[u8] { &self.staging }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compress::BatchCompressor, frame::FrameError};

    fn batch_bytes(compressor: &mut BatchCompressor, payload: &[u8], count: u64) -> Vec<u8> {
        let mut compressed = Vec::new();
        compressor.compress(payload, &mut compressed).unwrap();
        let mut wire =
            FrameHeader::new(u32::try_from(compressed.len()).unwrap(), count)
                .encode()
                .to_vec();
        wire.extend_from_slice(&compressed);
        wire
    }

    #[tokio::test]
    async fn consecutive_batches_share_stream_state() {
        let mut compressor = BatchCompressor::new(7);
        let mut wire = batch_bytes(&mut compressor, b"first batch", 2);
        wire.extend(batch_bytes(&mut compressor, b"second batch", 5));

        let mut pipeline = ReadPipeline::new(Box::new(std::io::Cursor::new(wire)), 1024, 1024);
        assert_eq!(pipeline.next_batch().await.unwrap(), 2);
        assert_eq!(pipeline.staging(), b"first batch");
        assert_eq!(pipeline.next_batch().await.unwrap(), 5);
        assert_eq!(pipeline.staging(), b"second batch");
    }

    #[tokio::test]
    async fn oversized_header_is_fatal() {
        let wire = FrameHeader::new(2048, 1).encode().to_vec();
        let mut pipeline = ReadPipeline::new(Box::new(std::io::Cursor::new(wire)), 1024, 1024);
        let err = pipeline.next_batch().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Frame(FrameError::InvalidLength { length: 2048, .. })
        ));
    }

    #[tokio::test]
    async fn zero_count_header_is_fatal() {
        let wire = FrameHeader { length: 4, count: 0 }.encode().to_vec();
        let mut pipeline = ReadPipeline::new(Box::new(std::io::Cursor::new(wire)), 1024, 1024);
        let err = pipeline.next_batch().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectionError::Frame(FrameError::InvalidCount)
        ));
    }

    #[tokio::test]
    async fn short_stream_is_fatal() {
        let mut compressor = BatchCompressor::new(7);
        let mut wire = batch_bytes(&mut compressor, b"payload", 1);
        wire.truncate(wire.len() - 3);

        let mut pipeline = ReadPipeline::new(Box::new(std::io::Cursor::new(wire)), 1024, 1024);
        let err = pipeline.next_batch().await.unwrap_err();
        assert!(matches!(err, ConnectionError::Io(_)));
    }
}
