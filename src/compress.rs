//! Persistent per-direction compression streams.
//!
//! One [`BatchCompressor`] and one [`BatchDecompressor`] live for a
//! connection's whole life. Batches are not independently framed at the
//! compression layer: every batch is a slice of the same zlib stream, ended
//! with a sync flush so the peer can decode it without waiting for more
//! data. Resetting either side mid-connection would desynchronize the
//! stream.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// Output growth step for the compression loops.
const CHUNK: usize = 16 * 1024;

/// Failures in the persistent compression streams.
///
/// Both variants are fatal at connection scope: a corrupt or oversized
/// stream cannot be re-aligned.
#[derive(Debug)]
pub enum CompressionError {
    /// The zlib stream was malformed or stalled without making progress.
    Corrupt(String),
    /// Decoded output would exceed the configured maximum batch size.
    DecodedTooLarge {
        /// Configured decoded-size limit in bytes.
        limit: usize,
    },
}

impl std::fmt::Display for CompressionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Corrupt(message) => write!(f, "corrupt compression stream: {message}"),
            Self::DecodedTooLarge { limit } => {
                write!(f, "decoded batch exceeds {limit} byte limit")
            }
        }
    }
}

impl std::error::Error for CompressionError {}

/// Outbound half of the connection's compression state.
pub struct BatchCompressor {
    inner: Compress,
}

impl BatchCompressor {
    /// Create a zlib compressor at the given level (0-9).
    #[must_use]
    pub fn new(level: u32) -> Self {
        Self {
            inner: Compress::new(Compression::new(level), true),
        }
    }

    /// Compress `input` onto the end of `out`, finishing with a sync flush.
    ///
    /// The sync flush ends the batch on a byte boundary, so the peer can
    /// decode everything staged so far without waiting for the next batch.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::Corrupt`] if the underlying stream
    /// reports an error or stops making progress.
    pub fn compress(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<(), CompressionError> {
        let mut remaining = input;
        while !remaining.is_empty() {
            let before_in = self.inner.total_in();
            if out.capacity() == out.len() {
                out.reserve(CHUNK);
            }
            self.inner
                .compress_vec(remaining, out, FlushCompress::None)
                .map_err(|e| CompressionError::Corrupt(e.to_string()))?;
            let consumed =
                usize::try_from(self.inner.total_in() - before_in).unwrap_or(remaining.len());
            if consumed == 0 && out.len() < out.capacity() {
                return Err(CompressionError::Corrupt("compressor stalled".into()));
            }
            remaining = &remaining[consumed..];
        }

        // Drive the sync flush until a call leaves spare output capacity;
        // a filled buffer means more flush output is still pending.
        loop {
            out.reserve(CHUNK);
            self.inner
                .compress_vec(&[], out, FlushCompress::Sync)
                .map_err(|e| CompressionError::Corrupt(e.to_string()))?;
            if out.len() < out.capacity() {
                return Ok(());
            }
        }
    }
}

/// Inbound half of the connection's compression state.
pub struct BatchDecompressor {
    inner: Decompress,
}

impl BatchDecompressor {
    /// Create a zlib decompressor expecting the standard zlib header.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(true),
        }
    }

    /// Decompress one batch payload onto the end of `out`.
    ///
    /// Consumes all of `input` (the exact compressed payload named by the
    /// batch header, including the writer's sync-flush marker).
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::DecodedTooLarge`] if the decoded output
    /// grows past `max_decoded`, or [`CompressionError::Corrupt`] if the
    /// stream errors or stalls before the input is consumed.
    pub fn decompress(
        &mut self,
        input: &[u8],
        out: &mut Vec<u8>,
        max_decoded: usize,
    ) -> Result<(), CompressionError> {
        let mut remaining = input;
        while !remaining.is_empty() {
            let before_in = self.inner.total_in();
            let before_out = self.inner.total_out();

            // Spare capacity is capped one byte past the limit so an
            // oversized batch is detected instead of looping.
            let budget = (max_decoded + 1).saturating_sub(out.len());
            if budget == 0 {
                return Err(CompressionError::DecodedTooLarge { limit: max_decoded });
            }
            if out.capacity() - out.len() < budget.min(CHUNK) {
                out.reserve(budget.min(CHUNK));
            }

            let status = self
                .inner
                .decompress_vec(remaining, out, FlushDecompress::None)
                .map_err(|e| CompressionError::Corrupt(e.to_string()))?;
            if out.len() > max_decoded {
                return Err(CompressionError::DecodedTooLarge { limit: max_decoded });
            }

            let consumed =
                usize::try_from(self.inner.total_in() - before_in).unwrap_or(remaining.len());
            remaining = &remaining[consumed..];

            match status {
                Status::StreamEnd => {
                    if remaining.is_empty() {
                        return Ok(());
                    }
                    return Err(CompressionError::Corrupt(
                        "data after end of compression stream".into(),
                    ));
                }
                Status::Ok | Status::BufError => {
                    if consumed == 0 && self.inner.total_out() == before_out {
                        return Err(CompressionError::Corrupt("decompressor stalled".into()));
                    }
                }
            }
        }
        Ok(())
    }
}

impl Default for BatchDecompressor {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_round_trip_through_persistent_streams() {
        let mut compressor = BatchCompressor::new(7);
        let mut decompressor = BatchDecompressor::new();

        // Two batches through the same stream pair; the second depends on
        // dictionary state carried over from the first.
        for payload in [&b"hello batch one"[..], &b"hello batch two"[..]] {
            let mut compressed = Vec::new();
            compressor.compress(payload, &mut compressed).unwrap();
            assert!(!compressed.is_empty());

            let mut decoded = Vec::new();
            decompressor
                .decompress(&compressed, &mut decoded, 1024)
                .unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn sync_flush_settles_with_bounded_output() {
        let mut compressor = BatchCompressor::new(7);
        let mut compressed = Vec::new();
        compressor.compress(b"tiny", &mut compressed).unwrap();
        assert!(compressed.len() < CHUNK);

        // A later batch on the same stream settles just as quickly.
        let before = compressed.len();
        compressor.compress(b"tiny again", &mut compressed).unwrap();
        assert!(compressed.len() - before < CHUNK);
    }

    #[test]
    fn oversized_decode_is_rejected() {
        let mut compressor = BatchCompressor::new(7);
        let mut decompressor = BatchDecompressor::new();

        let payload = vec![0u8; 4096];
        let mut compressed = Vec::new();
        compressor.compress(&payload, &mut compressed).unwrap();

        let mut decoded = Vec::new();
        let err = decompressor
            .decompress(&compressed, &mut decoded, 1024)
            .unwrap_err();
        assert!(matches!(
            err,
            CompressionError::DecodedTooLarge { limit: 1024 }
        ));
    }

    #[test]
    fn garbage_input_is_corrupt() {
        let mut decompressor = BatchDecompressor::new();
        let mut decoded = Vec::new();
        let err = decompressor
            .decompress(&[0xde, 0xad, 0xbe, 0xef], &mut decoded, 1024)
            .unwrap_err();
        assert!(matches!(err, CompressionError::Corrupt(_)));
    }

    #[test]
    fn empty_batch_compresses_to_flush_marker_only() {
        let mut compressor = BatchCompressor::new(7);
        let mut decompressor = BatchDecompressor::new();

        let mut compressed = Vec::new();
        compressor.compress(&[], &mut compressed).unwrap();

        let mut decoded = Vec::new();
        decompressor
            .decompress(&compressed, &mut decoded, 16)
            .unwrap();
        assert!(decoded.is_empty());
    }
}
