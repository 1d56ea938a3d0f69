//! Concurrent id-to-handler map with exactly-once close semantics.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

use super::{HandlerId, PacketHandler};

type HandlerMap = BTreeMap<HandlerId, Arc<dyn PacketHandler>>;

/// Per-connection handler registry.
///
/// Dispatch holds the read lock for the duration of a fan-out;
/// register/unregister take the write lock. A handler leaves the map exactly
/// once — via [`unregister`](Self::unregister) or
/// [`close_all`](Self::close_all) — and its `close` runs at that moment,
/// so concurrent teardown paths cannot double-close.
#[derive(Default)]
pub struct HandlerRegistry {
    next_id: AtomicU64,
    handlers: RwLock<HandlerMap>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Assign a fresh id to `handler` and store it.
    pub async fn register(&self, mut handler: Box<dyn PacketHandler>) -> HandlerId {
        let id = HandlerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        handler.set_id(id);
        self.handlers.write().await.insert(id, Arc::from(handler));
        debug!(%id, "handler registered");
        id
    }

    /// Remove the handler under `id` and close it.
    ///
    /// Returns false if no handler was registered under `id` (for example
    /// because a concurrent close already removed it).
    pub async fn unregister(&self, id: HandlerId) -> bool {
        let removed = self.handlers.write().await.remove(&id);
        match removed {
            Some(handler) => {
                handler.close().await;
                debug!(%id, "handler unregistered");
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy of the registered handlers for read-only
    /// iteration outside the lock.
    pub async fn snapshot(&self) -> Vec<(HandlerId, Arc<dyn PacketHandler>)> {
        self.handlers
            .read()
            .await
            .iter()
            .map(|(id, handler)| (*id, Arc::clone(handler)))
            .collect()
    }

    /// Number of registered handlers.
    pub async fn len(&self) -> usize { self.handlers.read().await.len() }

    /// Whether no handlers are registered.
    pub async fn is_empty(&self) -> bool { self.handlers.read().await.is_empty() }

    /// Drain the map and close every handler exactly once.
    pub async fn close_all(&self) {
        let drained = std::mem::take(&mut *self.handlers.write().await);
        for (_, handler) in drained {
            handler.close().await;
        }
    }

    /// Read-locked view for the dispatch fan-out.
    pub(crate) async fn read(&self) -> RwLockReadGuard<'_, HandlerMap> {
        self.handlers.read().await
    }
}
