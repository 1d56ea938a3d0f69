//! Injected id-to-constructor registry for packet types.

use dashmap::DashMap;

use super::{Authenticate, Packet, PlayerInfo};

/// Constructor producing an empty packet ready to be decoded into.
pub type PacketConstructor = fn() -> Box<dyn Packet>;

/// Maps wire type ids to packet constructors.
///
/// The registry is an explicit object handed to each connection at
/// construction rather than process-global state, so tests can scope what a
/// connection understands.
#[derive(Default)]
pub struct PacketRegistry {
    pool: DashMap<u32, PacketConstructor>,
}

impl PacketRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Create a registry preloaded with every packet type this crate ships.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(|| Box::new(Authenticate::default()));
        registry.register(|| Box::new(PlayerInfo::default()));
        registry
    }

    /// Register a constructor under the id its packets report.
    pub fn register(&self, constructor: PacketConstructor) {
        let id = constructor().id();
        self.pool.insert(id, constructor);
    }

    /// Instantiate an empty packet for `id`, or `None` if unregistered.
    #[must_use]
    pub fn find(&self, id: u32) -> Option<Box<dyn Packet>> {
        self.pool.get(&id).map(|constructor| constructor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{ID_AUTHENTICATE, ID_PLAYER_INFO};

    #[test]
    fn defaults_cover_shipped_packets() {
        let registry = PacketRegistry::with_defaults();
        assert_eq!(registry.find(ID_AUTHENTICATE).unwrap().id(), ID_AUTHENTICATE);
        assert_eq!(registry.find(ID_PLAYER_INFO).unwrap().id(), ID_PLAYER_INFO);
        assert!(registry.find(999).is_none());
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let registry = PacketRegistry::new();
        registry.register(|| Box::new(Authenticate::default()));
        registry.register(|| {
            Box::new(Authenticate {
                token: String::from("preset"),
            })
        });
        let packet = registry.find(ID_AUTHENTICATE).unwrap();
        let auth = packet.as_any().downcast_ref::<Authenticate>().unwrap();
        assert_eq!(auth.token, "preset");
    }
}
