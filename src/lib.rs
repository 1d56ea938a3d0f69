//! Public API for the `batchwire` library.
//!
//! `batchwire` is a connection-scoped endpoint for a batched, compressed
//! binary packet protocol over a reliable ordered stream. It frames
//! outgoing packets into periodically flushed compressed batches, decodes
//! incoming batches through a persistent per-direction compression stream,
//! and dispatches each packet through a chain of stateful handlers with
//! authentication gating.
//!
//! The transport is any `AsyncRead + AsyncWrite` stream; establishing it,
//! validating authentication tokens, and configuring log output are the
//! caller's concern.

pub mod compress;
pub mod config;
pub mod connection;
pub mod context;
mod deferred;
mod dispatch;
pub mod error;
pub mod frame;
pub mod handler;
pub mod packet;
mod read;
pub mod wire;
mod write;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use context::{ContextError, PacketContext};
pub use error::{ConnectionError, Result};
pub use handler::{Disposition, HandlerId, PacketHandler};
pub use packet::{Packet, PacketRegistry};
