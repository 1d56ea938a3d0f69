//! Batch frame header encoding and decoding.
//!
//! Each batch on the wire is prefixed by a fixed 12-byte cleartext header:
//! a 4-byte little-endian payload length followed by an 8-byte little-endian
//! packet count. The payload itself is a slice of the connection's persistent
//! compression stream, so the header is the only per-batch cleartext.

use bytes::{Buf, BufMut};

/// Size in bytes of the cleartext header preceding every batch.
pub const HEADER_SIZE: usize = 12;

/// Cleartext prefix describing one compressed batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Byte length of the compressed payload following the header.
    pub length: u32,
    /// Number of packets concatenated in the decoded payload.
    pub count: u64,
}

/// Header validation failures.
///
/// Both variants are fatal: once a header is malformed there is no way to
/// re-align the byte stream, so the connection must close.
#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// The claimed payload length exceeds the receive buffer capacity.
    InvalidLength {
        /// Length claimed by the header.
        length: u32,
        /// Configured receive buffer capacity.
        capacity: usize,
    },
    /// The header claimed a batch with no packets in it.
    InvalidCount,
    /// Decoded staging bytes were left over after the final packet.
    TrailingBytes(usize),
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLength { length, capacity } => {
                write!(f, "invalid batch length {length} (capacity {capacity})")
            }
            Self::InvalidCount => f.write_str("invalid packet count 0"),
            Self::TrailingBytes(remaining) => {
                write!(f, "{remaining} undecoded bytes left in batch")
            }
        }
    }
}

impl std::error::Error for FrameError {}

impl FrameHeader {
    /// Create a header for a payload of `length` bytes holding `count` packets.
    #[must_use]
    pub fn new(length: u32, count: u64) -> Self { Self { length, count } }

    /// Encode the header into its fixed 12-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let mut dst = &mut buf[..];
        dst.put_u32_le(self.length);
        dst.put_u64_le(self.count);
        buf
    }

    /// Decode and validate a header from `buf`.
    ///
    /// `capacity` is the size of the receive buffer the payload must fit in.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidLength`] if the claimed payload length
    /// exceeds `capacity`, or [`FrameError::InvalidCount`] if the packet
    /// count is zero.
    ///
    /// # Panics
    ///
    /// Panics if `buf` is shorter than [`HEADER_SIZE`]; callers read exactly
    /// that many bytes before decoding.
    pub fn decode(buf: &[u8], capacity: usize) -> Result<Self, FrameError> {
        assert!(buf.len() >= HEADER_SIZE, "short header buffer");

        let mut src = &buf[..HEADER_SIZE];
        let length = src.get_u32_le();
        let count = src.get_u64_le();

        if length as usize > capacity {
            return Err(FrameError::InvalidLength { length, capacity });
        }
        if count == 0 {
            return Err(FrameError::InvalidCount);
        }
        Ok(Self { length, count })
    }
}
