//! Canonical error types for the crate.
//!
//! Every fatal pipeline failure funnels into [`ConnectionError`] and, from
//! there, into the connection's single idempotent close. Caller-misuse
//! variants (`NotConnected`, `WriterUnavailable`) are returned synchronously
//! and are not fatal beyond that call.

use crate::{compress::CompressionError, frame::FrameError, wire::WireError};

/// Boxed error recorded on a packet context by a handler.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Top-level error type exposed by `batchwire`.
#[derive(Debug)]
pub enum ConnectionError {
    /// A read, write, or flush on the underlying transport failed.
    Io(std::io::Error),
    /// A batch header failed validation; stream alignment is unrecoverable.
    Frame(FrameError),
    /// The persistent compression stream produced or consumed garbage.
    Compression(CompressionError),
    /// A packet body could not be decoded from the batch staging region.
    Wire(WireError),
    /// A packet type id had no registered constructor.
    UnknownPacketType(u32),
    /// A handler recorded an error while processing a packet.
    Handler {
        /// Runtime type name of the offending packet.
        packet: &'static str,
        /// The first error recorded on the dispatch context.
        source: BoxError,
    },
    /// The connection was already closed when the operation was attempted.
    NotConnected,
    /// No transport writer is attached to the connection.
    WriterUnavailable,
    /// An unexpected panic was caught at the driver or staging boundary.
    Panic(String),
}

impl ConnectionError {
    /// Returns true when the error indicates caller misuse of a dead or
    /// uninitialized connection rather than a pipeline failure.
    #[must_use]
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::NotConnected | Self::WriterUnavailable)
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(error) => write!(f, "transport error: {error}"),
            Self::Frame(error) => write!(f, "frame error: {error}"),
            Self::Compression(error) => write!(f, "compression error: {error}"),
            Self::Wire(error) => write!(f, "packet decode error: {error}"),
            Self::UnknownPacketType(id) => write!(f, "unknown packet type id {id}"),
            Self::Handler { packet, source } => {
                write!(f, "error while processing {packet}: {source}")
            }
            Self::NotConnected => f.write_str("connection is not connected"),
            Self::WriterUnavailable => f.write_str("no transport writer attached"),
            Self::Panic(message) => write!(f, "unexpected panic: {message}"),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::Frame(error) => Some(error),
            Self::Compression(error) => Some(error),
            Self::Wire(error) => Some(error),
            Self::Handler { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(error: std::io::Error) -> Self { Self::Io(error) }
}

impl From<FrameError> for ConnectionError {
    fn from(error: FrameError) -> Self { Self::Frame(error) }
}

impl From<CompressionError> for ConnectionError {
    fn from(error: CompressionError) -> Self { Self::Compression(error) }
}

impl From<WireError> for ConnectionError {
    fn from(error: WireError) -> Self { Self::Wire(error) }
}

/// Canonical result alias used by `batchwire` public APIs.
pub type Result<T> = std::result::Result<T, ConnectionError>;
