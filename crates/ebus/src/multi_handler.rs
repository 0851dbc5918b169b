use crate::bus::Bus;
use crate::error::BusError;
use crate::holder::NodeLink;
use crate::mutex::{HandlerMutex, lock_range};
use crate::policy::{DefaultEventProcessing, EventProcessingPolicy};
use crate::{BusId, Interface};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Connects one handler object to any number of addresses of a bus.
///
/// Dropping the `MultiHandler` disconnects it from every address.
pub struct MultiHandler<Id, I, P = DefaultEventProcessing>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    bus: Bus<Id, I, P>,
    handler: Arc<I>,
    nodes: Mutex<FxHashMap<Id, NodeLink>>,
}

impl<Id, I, P> MultiHandler<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    pub fn new(bus: &Bus<Id, I, P>, handler: Arc<I>) -> Self {
        Self { bus: bus.clone(), handler, nodes: Mutex::new(FxHashMap::default()) }
    }

    /// Connects to address `id`. Connecting to an address twice is a no-op.
    ///
    /// # Errors
    /// Returns [`BusError::Shutdown`] if the bus was shut down.
    pub fn bus_connect(&self, id: Id) -> Result<(), BusError> {
        let context = self.bus.context();
        let mut context_state = context.lock();
        if context.is_closed() {
            warn!(?id, "Connect rejected: bus shut down");
            return Err(BusError::Shutdown {
                message: "cannot connect a multi-handler".into(),
                context: Some(format!("{id:?}").into()),
            });
        }

        let mut nodes = self.nodes.lock();
        if nodes.contains_key(&id) {
            return Ok(());
        }
        let node = self.bus.next_node_id();
        let link = context_state.addresses.create_or_get(id.clone()).push(node, Arc::clone(&self.handler));
        trace!(?id, node, connections = nodes.len() + 1, "Multi-handler connected");
        nodes.insert(id, link);
        Ok(())
    }

    /// Disconnects from `id`, waiting for any dispatch still running there.
    pub fn bus_disconnect_id(&self, id: &Id) {
        let Some(context) = self.bus.existing_context() else {
            return;
        };
        let link = {
            let mut context_state = context.lock();
            let Some(link) = self.nodes.lock().remove(id) else {
                return;
            };
            context_state.addresses.disconnect_internal(id, link.node);
            trace!(?id, node = link.node, "Multi-handler unlinked");
            link
        };
        link.handler_mutex.wait();
    }

    /// Disconnects from every address.
    ///
    /// All connections are unlinked in one critical section. Then every
    /// address lock is acquired together, so the call returns only once no
    /// dispatch to any of the old addresses is still running.
    pub fn bus_disconnect(&self) {
        let Some(context) = self.bus.existing_context() else {
            return;
        };
        let mutexes: Vec<HandlerMutex> = {
            let mut context_state = context.lock();
            let nodes = std::mem::take(&mut *self.nodes.lock());
            nodes
                .into_iter()
                .map(|(id, link)| {
                    context_state.addresses.disconnect_internal(&id, link.node);
                    link.handler_mutex
                })
                .collect()
        };
        if mutexes.is_empty() {
            return;
        }

        drop(lock_range(&mutexes));
        debug!(addresses = mutexes.len(), "Multi-handler disconnected");
    }

    /// Returns `true` while connected to at least one address of a live bus.
    #[must_use]
    pub fn bus_is_connected(&self) -> bool {
        !self.bus.is_shut_down() && !self.nodes.lock().is_empty()
    }

    #[must_use]
    pub fn bus_is_connected_id(&self, id: &Id) -> bool {
        !self.bus.is_shut_down() && self.nodes.lock().contains_key(id)
    }

    /// Addresses this handler is connected to, in no particular order.
    #[must_use]
    pub fn connected_ids(&self) -> Vec<Id> {
        if self.bus.is_shut_down() {
            return Vec::new();
        }
        self.nodes.lock().keys().cloned().collect()
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<I> {
        &self.handler
    }

    #[must_use]
    pub fn bus(&self) -> &Bus<Id, I, P> {
        &self.bus
    }
}

impl<Id, I, P> Drop for MultiHandler<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    fn drop(&mut self) {
        self.bus_disconnect();
    }
}

impl<Id, I, P> fmt::Debug for MultiHandler<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiHandler")
            .field("bus", &self.bus)
            .field("ids", &self.connected_ids())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Tag = dyn Fn() -> u32 + Send + Sync;

    fn tag(n: u32) -> Arc<Tag> {
        Arc::new(move || n)
    }

    #[test]
    fn connects_to_many_addresses_once_each() {
        let bus: Bus<u8, Tag> = Bus::new();
        let multi = MultiHandler::new(&bus, tag(7));

        for id in [1, 2, 3, 2] {
            multi.bus_connect(id).unwrap();
        }
        let mut ids = multi.connected_ids();
        ids.sort_unstable();
        assert_eq!(ids, [1, 2, 3]);
        assert_eq!(bus.handler_count(&2), 1);
        assert_eq!(bus.event_result(&3, |h| h()), Some(7));
    }

    #[test]
    fn disconnect_id_leaves_other_addresses() {
        let bus: Bus<u8, Tag> = Bus::new();
        let multi = MultiHandler::new(&bus, tag(1));
        multi.bus_connect(1).unwrap();
        multi.bus_connect(2).unwrap();

        multi.bus_disconnect_id(&1);
        multi.bus_disconnect_id(&9);
        assert!(!multi.bus_is_connected_id(&1));
        assert!(multi.bus_is_connected_id(&2));
        assert_eq!(bus.address_count(), 1);
    }

    #[test]
    fn disconnect_all_and_drop() {
        let bus: Bus<u8, Tag> = Bus::new();
        let multi = MultiHandler::new(&bus, tag(1));
        for id in 0..5 {
            multi.bus_connect(id).unwrap();
        }
        multi.bus_disconnect();
        assert!(!multi.bus_is_connected());
        assert_eq!(bus.address_count(), 0);

        multi.bus_connect(4).unwrap();
        drop(multi);
        assert_eq!(bus.address_count(), 0);
    }

    #[test]
    fn shutdown_empties_connected_ids() {
        let bus: Bus<u8, Tag> = Bus::new();
        let multi = MultiHandler::new(&bus, tag(1));
        multi.bus_connect(1).unwrap();
        bus.shutdown();
        assert!(multi.connected_ids().is_empty());
        assert!(matches!(multi.bus_connect(2), Err(BusError::Shutdown { .. })));
    }
}
