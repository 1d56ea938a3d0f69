//! Authentication packet.

use std::any::Any;

use super::{ID_AUTHENTICATE, Packet};
use crate::wire::{Wire, WireError};

/// First packet a peer sends: carries the token the connection is gated on.
///
/// The token is opaque to this crate; an injected validator decides whether
/// it is acceptable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Authenticate {
    /// Opaque authentication token.
    pub token: String,
}

impl Packet for Authenticate {
    fn id(&self) -> u32 { ID_AUTHENTICATE }

    fn name(&self) -> &'static str { std::any::type_name::<Self>() }

    fn marshal(&mut self, io: &mut dyn Wire) -> Result<(), WireError> { io.string(&mut self.token) }

    fn as_any(&self) -> &dyn Any { self }
}
