//! Authentication gate for freshly accepted connections.

use std::sync::Weak;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{Disposition, HandlerId, PacketHandler};
use crate::{connection::Connection, context::PacketContext, packet::Authenticate};

/// Opaque token-validation oracle.
///
/// The validation algorithm lives outside this crate; the pipeline only
/// cares whether a token is acceptable.
pub trait TokenValidator: Send + Sync {
    /// Whether `token` authenticates the peer.
    fn validate(&self, token: &str) -> bool;
}

impl<F> TokenValidator for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn validate(&self, token: &str) -> bool { self(token) }
}

/// Authentication failures recorded on the dispatch context.
///
/// Surfaced as a handler error, which is fatal at connection scope: an
/// unauthenticated peer is disconnected rather than retried.
#[derive(Debug)]
pub enum AuthError {
    /// A packet other than [`Authenticate`] arrived before authentication.
    UnexpectedPacket(&'static str),
    /// The presented token failed validation.
    InvalidToken,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedPacket(name) => {
                write!(f, "expected authentication packet, got {name}")
            }
            Self::InvalidToken => f.write_str("unable to validate authentication token"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Handler gating a connection on its first [`Authenticate`] packet.
///
/// Once the peer authenticates, the handler marks the connection and
/// removes itself via [`Disposition::Unregister`].
pub struct AuthenticationHandler {
    connection: Weak<Connection>,
    validator: Box<dyn TokenValidator>,
    id: Option<HandlerId>,
}

impl AuthenticationHandler {
    /// Create a gate for `connection` backed by `validator`.
    #[must_use]
    pub fn new(
        connection: &std::sync::Arc<Connection>,
        validator: impl TokenValidator + 'static,
    ) -> Self {
        Self {
            connection: std::sync::Arc::downgrade(connection),
            validator: Box::new(validator),
            id: None,
        }
    }
}

#[async_trait]
impl PacketHandler for AuthenticationHandler {
    fn set_id(&mut self, id: HandlerId) { self.id = Some(id); }

    async fn receive(&self, ctx: &mut PacketContext) -> Disposition {
        let Some(connection) = self.connection.upgrade() else {
            return Disposition::Unregister;
        };
        if connection.authenticated() {
            return Disposition::Unregister;
        }

        let Ok(packet) = ctx.packet() else {
            return Disposition::Continue;
        };
        let name = packet.name();
        let Some(auth) = packet.as_any().downcast_ref::<Authenticate>() else {
            let _ = ctx.set_error(AuthError::UnexpectedPacket(name));
            return Disposition::Continue;
        };
        if !self.validator.validate(&auth.token) {
            warn!(addr = %connection.peer_addr(), "authentication token rejected");
            let _ = ctx.set_error(AuthError::InvalidToken);
            return Disposition::Continue;
        }

        connection.set_authenticated(true);
        debug!(addr = %connection.peer_addr(), "peer authenticated");
        Disposition::Unregister
    }

    async fn close(&self) {}
}
