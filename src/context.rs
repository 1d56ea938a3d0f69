//! Per-dispatch packet envelope.
//!
//! Exactly one [`PacketContext`] is created per inbound packet. It carries
//! the packet through one fan-out pass along with observational cancel state
//! and the first error any handler recorded. The dispatcher completes the
//! context immediately after the fan-out; every accessor fails
//! deterministically afterwards, which catches handlers that try to use a
//! context past its window.

use crate::{error::BoxError, packet::Packet};

/// Error returned by every [`PacketContext`] accessor after completion.
#[derive(Debug, PartialEq, Eq)]
pub struct ContextError;

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("packet context already completed")
    }
}

impl std::error::Error for ContextError {}

/// Envelope wrapping one packet for one dispatch pass.
pub struct PacketContext {
    packet: Option<Box<dyn Packet>>,
    error: Option<BoxError>,
    cancelled: bool,
    completed: bool,
}

impl PacketContext {
    /// Wrap a freshly decoded packet.
    #[must_use]
    pub fn new(packet: Box<dyn Packet>) -> Self {
        Self {
            packet: Some(packet),
            error: None,
            cancelled: false,
            completed: false,
        }
    }

    fn live(&self) -> Result<(), ContextError> {
        if self.completed { Err(ContextError) } else { Ok(()) }
    }

    /// The packet under dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the context has completed.
    pub fn packet(&self) -> Result<&dyn Packet, ContextError> {
        self.live()?;
        Ok(self.packet.as_deref().unwrap_or_else(|| unreachable!()))
    }

    /// Mutable access to the packet; valid only within the dispatch call.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the context has completed.
    pub fn packet_mut(&mut self) -> Result<&mut dyn Packet, ContextError> {
        self.live()?;
        match self.packet.as_deref_mut() {
            Some(packet) => Ok(packet),
            None => unreachable!("live context always holds its packet"),
        }
    }

    /// Mark the dispatch cancelled. Cancellation is observational: later
    /// handlers still run and may choose to honor it.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the context has completed.
    pub fn cancel(&mut self) -> Result<(), ContextError> {
        self.live()?;
        self.cancelled = true;
        Ok(())
    }

    /// Whether an earlier handler cancelled this dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the context has completed.
    pub fn cancelled(&self) -> Result<bool, ContextError> {
        self.live()?;
        Ok(self.cancelled)
    }

    /// Record a handler error. Only the first recorded error is kept; later
    /// calls are accepted no-ops.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the context has completed.
    pub fn set_error(&mut self, error: impl Into<BoxError>) -> Result<(), ContextError> {
        self.live()?;
        if self.error.is_none() {
            self.error = Some(error.into());
        }
        Ok(())
    }

    /// The first recorded error, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the context has completed.
    pub fn error(&self) -> Result<Option<&BoxError>, ContextError> {
        self.live()?;
        Ok(self.error.as_ref())
    }

    /// Complete the context, releasing the packet and yielding its runtime
    /// type name together with the first recorded error.
    ///
    /// Idempotent: a second call reports no error and the placeholder name
    /// of an already-completed context.
    pub fn complete(&mut self) -> (&'static str, Option<BoxError>) {
        let name = self.packet.as_deref().map_or("<completed>", Packet::name);
        self.completed = true;
        self.packet = None;
        (name, self.error.take())
    }
}
