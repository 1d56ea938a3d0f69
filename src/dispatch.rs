//! Routing of decoded packets to the deferred queue or the handler chain.

use std::{collections::BTreeMap, sync::Arc};

use tokio::sync::RwLockReadGuard;

use crate::{
    context::PacketContext,
    deferred::DeferredQueue,
    error::{ConnectionError, Result},
    handler::{Disposition, HandlerId, HandlerRegistry, PacketHandler},
    packet::Packet,
};

type FanOutGuard<'a> = RwLockReadGuard<'a, BTreeMap<HandlerId, Arc<dyn PacketHandler>>>;

/// Routes one decoded packet per call, only ever invoked by the single
/// driver task, so no two fan-outs race; the handler registry's locks only
/// contend with register/unregister.
pub(crate) struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    deferred: DeferredQueue,
}

impl Dispatcher {
    pub(crate) fn new(registry: Arc<HandlerRegistry>, deferred_capacity: usize) -> Self {
        Self {
            registry,
            deferred: DeferredQueue::new(deferred_capacity),
        }
    }

    /// Route `packet`: queue it if no handler exists yet, otherwise run the
    /// full fan-out. A recorded handler error fails the dispatch and is
    /// fatal to the connection.
    pub(crate) async fn dispatch(&self, packet: Box<dyn Packet>) -> Result<()> {
        // Deliver older deferred packets first so arrival order survives a
        // late handler registration.
        self.drain_deferred().await?;

        // The emptiness check and the fan-out share one read guard, so the
        // last handler cannot unregister in between and strand the packet.
        let guard = self.registry.read().await;
        if guard.is_empty() {
            drop(guard);
            self.deferred
                .push(packet)
                .await
                .map_err(|_| ConnectionError::NotConnected)?;
            return Ok(());
        }
        self.fan_out(guard, packet).await
    }

    async fn drain_deferred(&self) -> Result<()> {
        loop {
            let guard = self.registry.read().await;
            if guard.is_empty() {
                return Ok(());
            }
            let Some(packet) = self.deferred.pop().await else {
                return Ok(());
            };
            self.fan_out(guard, packet).await?;
        }
    }

    async fn fan_out(&self, guard: FanOutGuard<'_>, packet: Box<dyn Packet>) -> Result<()> {
        let mut ctx = PacketContext::new(packet);
        let mut unregister = Vec::new();
        for (id, handler) in guard.iter() {
            // Every handler runs; cancellation and recorded errors are
            // observational until the fan-out finishes.
            if handler.receive(&mut ctx).await == Disposition::Unregister {
                unregister.push(*id);
            }
        }
        drop(guard);

        let (packet_name, error) = ctx.complete();
        for id in unregister {
            self.registry.unregister(id).await;
        }
        match error {
            Some(source) => Err(ConnectionError::Handler {
                packet: packet_name,
                source,
            }),
            None => Ok(()),
        }
    }

    /// Close the deferred queue, unblocking a driver awaiting queue space.
    pub(crate) async fn close(&self) { self.deferred.close().await; }
}
