//! Application packet contract and concrete packet types.
//!
//! On the wire a packet is a 4-byte little-endian type id followed by the
//! type's own field encoding. Types describe that encoding once through the
//! symmetric [`Wire`] marshal contract, and a [`PacketRegistry`] maps ids to
//! constructors so the read pipeline can instantiate them.

use std::any::Any;

use crate::wire::{Wire, WireError};

mod authenticate;
mod player_info;
mod registry;

pub use authenticate::Authenticate;
pub use player_info::PlayerInfo;
pub use registry::PacketRegistry;

/// Type id of the [`Authenticate`] packet.
pub const ID_AUTHENTICATE: u32 = 0;
/// Type id of the [`PlayerInfo`] packet.
pub const ID_PLAYER_INFO: u32 = 1;

/// A self-describing application packet.
///
/// A packet is a value: it is never shared across dispatches and is mutable
/// in place only within one dispatch call.
pub trait Packet: Any + Send + std::fmt::Debug {
    /// Numeric type id identifying the packet on the wire.
    fn id(&self) -> u32;

    /// Runtime type name, used to annotate handler failures.
    fn name(&self) -> &'static str;

    /// Encode or decode every field against the cursor, in wire order.
    ///
    /// # Errors
    ///
    /// Returns a [`WireError`] if the cursor cannot satisfy a field.
    fn marshal(&mut self, io: &mut dyn Wire) -> Result<(), WireError>;

    /// Upcast for handler-side downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}
