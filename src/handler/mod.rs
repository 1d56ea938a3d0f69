//! Stateful packet handlers and their per-connection registry.
//!
//! Handlers subscribe to every decoded packet on a connection. The dispatch
//! fan-out holds the registry's read lock, so a handler must never mutate
//! the registry from inside its own `receive`; self-removal is expressed by
//! returning [`Disposition::Unregister`], which the dispatcher applies after
//! the lock is released.

use async_trait::async_trait;

use crate::context::PacketContext;

pub mod auth;
pub mod recorder;
mod registry;

pub use registry::HandlerRegistry;

/// Identifier assigned to a handler at registration.
///
/// Ids are monotonic per registry, so registration order and iteration
/// order coincide and tests are reproducible.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn new(id: u64) -> Self { Self(id) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

/// What the dispatcher should do with a handler after one `receive` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Keep the handler registered.
    Continue,
    /// Unregister (and close) the handler once the fan-out lock is released.
    Unregister,
}

/// A subscriber reacting to decoded packets through a [`PacketContext`].
///
/// Handlers run on the connection's single driver task and are expected to
/// be non-blocking; long work must be handed off to its own task.
#[async_trait]
pub trait PacketHandler: Send + Sync {
    /// Store the id the registry assigned; called once before insertion.
    fn set_id(&mut self, id: HandlerId);

    /// React to one packet. Record failures with
    /// [`PacketContext::set_error`]; the first recorded error in a fan-out
    /// closes the connection.
    async fn receive(&self, ctx: &mut PacketContext) -> Disposition;

    /// Release handler resources. Invoked exactly once, on unregistration
    /// or connection close, whichever comes first.
    async fn close(&self);
}
