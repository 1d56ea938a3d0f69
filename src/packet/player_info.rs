//! Player information packet.

use std::any::Any;

use super::{ID_PLAYER_INFO, Packet};
use crate::wire::{Wire, WireError};

/// Initial description of the player behind a connection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerInfo {
    /// Runtime id of the shield item, required by downstream protocol
    /// readers to decode an extra item field.
    pub shield_id: i32,
    /// Platform-authoritative identity data; empty when the player is not
    /// signed in.
    pub identity_data: Vec<u8>,
    /// Client-authoritative data blob.
    pub client_data: Vec<u8>,
    /// Initial player position.
    pub position: [f32; 3],
}

impl Packet for PlayerInfo {
    fn id(&self) -> u32 { ID_PLAYER_INFO }

    fn name(&self) -> &'static str { std::any::type_name::<Self>() }

    fn marshal(&mut self, io: &mut dyn Wire) -> Result<(), WireError> {
        io.i32(&mut self.shield_id)?;
        // Identity data is optional on the wire: a presence flag, then the
        // blob only when non-empty.
        let mut has_identity = !self.identity_data.is_empty();
        io.bool(&mut has_identity)?;
        if has_identity {
            io.bytes(&mut self.identity_data)?;
        } else {
            self.identity_data.clear();
        }
        io.bytes(&mut self.client_data)?;
        io.vec3(&mut self.position)
    }

    fn as_any(&self) -> &dyn Any { self }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::wire::{WireReader, WireWriter};

    fn round_trip(mut packet: PlayerInfo) -> PlayerInfo {
        let mut buf = BytesMut::new();
        packet.marshal(&mut WireWriter::new(&mut buf)).unwrap();

        let mut decoded = PlayerInfo::default();
        let mut reader = WireReader::new(&buf);
        decoded.marshal(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        decoded
    }

    #[test]
    fn identity_data_round_trips_when_present() {
        let packet = PlayerInfo {
            shield_id: -7,
            identity_data: vec![9, 9, 9],
            client_data: vec![1, 2],
            position: [1.0, 2.0, 3.0],
        };
        assert_eq!(round_trip(packet.clone()), packet);
    }

    #[test]
    fn identity_data_is_omitted_when_empty() {
        let packet = PlayerInfo {
            shield_id: 3,
            identity_data: Vec::new(),
            client_data: vec![4],
            position: [0.0, -1.5, 8.25],
        };
        let mut sized = packet.clone();
        let mut buf = BytesMut::new();
        sized.marshal(&mut WireWriter::new(&mut buf)).unwrap();
        // i32 + flag + client_data prefix + 1 byte + vec3
        assert_eq!(buf.len(), 4 + 1 + 4 + 1 + 12);
        assert_eq!(round_trip(packet.clone()), packet);
    }
}
