//! Session recorder for authenticated traffic.

use std::sync::{Mutex, Weak};

use async_trait::async_trait;
use tracing::trace;

use super::{Disposition, HandlerId, PacketHandler};
use crate::{connection::Connection, context::PacketContext};

/// Error recorded when traffic arrives before the peer authenticated.
#[derive(Debug)]
pub struct NotAuthenticated;

impl std::fmt::Display for NotAuthenticated {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("client not authenticated")
    }
}

impl std::error::Error for NotAuthenticated {}

/// Records the packet ids seen on a session for later analysis or replay.
///
/// Rejects any packet that arrives before the connection is authenticated;
/// the resulting context error closes the connection.
pub struct PacketRecorder {
    connection: Weak<Connection>,
    seen: Mutex<Vec<u32>>,
}

impl PacketRecorder {
    /// Create a recorder for `connection`.
    #[must_use]
    pub fn new(connection: &std::sync::Arc<Connection>) -> Self {
        Self {
            connection: std::sync::Arc::downgrade(connection),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Ids of every packet recorded so far, in arrival order.
    #[must_use]
    pub fn seen(&self) -> Vec<u32> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PacketHandler for PacketRecorder {
    fn set_id(&mut self, _id: HandlerId) {}

    async fn receive(&self, ctx: &mut PacketContext) -> Disposition {
        let authenticated = self
            .connection
            .upgrade()
            .is_some_and(|connection| connection.authenticated());
        if !authenticated {
            let _ = ctx.set_error(NotAuthenticated);
            return Disposition::Continue;
        }

        if let Ok(packet) = ctx.packet() {
            trace!(id = packet.id(), name = packet.name(), "packet recorded");
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(packet.id());
            }
        }
        Disposition::Continue
    }

    async fn close(&self) {}
}
