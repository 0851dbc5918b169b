use crate::bus::Bus;
use crate::error::BusError;
use crate::holder::NodeLink;
use crate::mutex::HandlerMutex;
use crate::policy::{DefaultEventProcessing, EventProcessingPolicy};
use crate::{BusId, Interface};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Observable connection state of a [`Handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    /// Unlinked from its address, waiting for in-flight dispatch to finish.
    Disconnecting,
}

enum NodeState<Id> {
    Disconnected,
    Connected(Id, NodeLink),
    Disconnecting(HandlerMutex),
}

/// Connects one handler object to at most one address of a bus.
///
/// Dropping the `Handler` disconnects it, waiting for any dispatch still
/// running at its address.
///
/// # Examples
/// ```rust
/// use ebus::{Bus, ConnectionState, Handler};
/// use std::sync::Arc;
///
/// trait Ping: Send + Sync {
///     fn ping(&self);
/// }
/// struct Quiet;
/// impl Ping for Quiet {
///     fn ping(&self) {}
/// }
///
/// # fn main() -> Result<(), ebus::BusError> {
/// let bus: Bus<&'static str, dyn Ping> = Bus::new();
/// let handler = Handler::new(&bus, Arc::new(Quiet) as Arc<dyn Ping>);
///
/// handler.bus_connect("lobby")?;
/// assert_eq!(handler.bus_id(), Some("lobby"));
/// assert!(handler.bus_connect("cellar").is_err());
///
/// handler.bus_disconnect();
/// assert_eq!(handler.state(), ConnectionState::Disconnected);
/// # Ok(())
/// # }
/// ```
pub struct Handler<Id, I, P = DefaultEventProcessing>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    bus: Bus<Id, I, P>,
    handler: Arc<I>,
    state: Mutex<NodeState<Id>>,
}

impl<Id, I, P> Handler<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    /// Wraps `handler` for connection to `bus`. Starts disconnected.
    pub fn new(bus: &Bus<Id, I, P>, handler: Arc<I>) -> Self {
        Self { bus: bus.clone(), handler, state: Mutex::new(NodeState::Disconnected) }
    }

    /// Connects to address `id`.
    ///
    /// Connecting again to the current address is a no-op.
    ///
    /// # Errors
    /// Returns [`BusError::AlreadyConnected`] if connected to another
    /// address, or [`BusError::Shutdown`] if the bus was shut down.
    pub fn bus_connect(&self, id: Id) -> Result<(), BusError> {
        let context = self.bus.context();
        let mut context_state = context.lock();
        if context.is_closed() {
            warn!(?id, "Connect rejected: bus shut down");
            return Err(BusError::Shutdown {
                message: "cannot connect a handler".into(),
                context: Some(format!("{id:?}").into()),
            });
        }

        let mut state = self.state.lock();
        if let NodeState::Connected(current, _) = &*state {
            if *current == id {
                return Ok(());
            }
            warn!(?id, ?current, "Connect rejected: handler already connected");
            return Err(BusError::AlreadyConnected {
                message: format!("connected to {current:?}").into(),
                context: Some(format!("{id:?}").into()),
            });
        }

        let node = self.bus.next_node_id();
        let link = context_state.addresses.create_or_get(id.clone()).push(node, Arc::clone(&self.handler));
        trace!(?id, node, "Handler connected");
        *state = NodeState::Connected(id, link);
        Ok(())
    }

    /// Disconnects from the current address, if any.
    ///
    /// Returns once no dispatch to the old address is still running on
    /// another thread, so the handler object may be destroyed right after.
    /// Calling this from a callback of the same address is allowed.
    pub fn bus_disconnect(&self) {
        self.disconnect_where(|_| true);
    }

    /// Disconnects from `id` if currently connected to it.
    pub fn bus_disconnect_id(&self, id: &Id) {
        self.disconnect_where(|current| current == id);
    }

    /// Returns `true` while connected to an address of a live bus.
    #[must_use]
    pub fn bus_is_connected(&self) -> bool {
        !self.bus.is_shut_down() && matches!(&*self.state.lock(), NodeState::Connected(..))
    }

    #[must_use]
    pub fn bus_is_connected_id(&self, id: &Id) -> bool {
        !self.bus.is_shut_down()
            && matches!(&*self.state.lock(), NodeState::Connected(current, _) if current == id)
    }

    /// Address this handler is connected to.
    #[must_use]
    pub fn bus_id(&self) -> Option<Id> {
        if self.bus.is_shut_down() {
            return None;
        }
        match &*self.state.lock() {
            NodeState::Connected(id, _) => Some(id.clone()),
            NodeState::Disconnected | NodeState::Disconnecting(_) => None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        let shut_down = self.bus.is_shut_down();
        match &*self.state.lock() {
            NodeState::Connected(..) if shut_down => ConnectionState::Disconnected,
            NodeState::Connected(..) => ConnectionState::Connected,
            NodeState::Disconnecting(_) => ConnectionState::Disconnecting,
            NodeState::Disconnected => ConnectionState::Disconnected,
        }
    }

    #[must_use]
    pub fn handler(&self) -> &Arc<I> {
        &self.handler
    }

    #[must_use]
    pub fn bus(&self) -> &Bus<Id, I, P> {
        &self.bus
    }

    fn disconnect_where(&self, predicate: impl Fn(&Id) -> bool) {
        let Some(context) = self.bus.existing_context() else {
            return;
        };

        let mutex = {
            let mut context_state = context.lock();
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, NodeState::Disconnected) {
                NodeState::Connected(id, link) if predicate(&id) => {
                    context_state.addresses.disconnect_internal(&id, link.node);
                    trace!(?id, node = link.node, "Handler unlinked");
                    *state = NodeState::Disconnecting(link.handler_mutex.clone());
                    link.handler_mutex
                },
                // another thread is already waiting; wait as well
                NodeState::Disconnecting(mutex) => {
                    *state = NodeState::Disconnecting(mutex.clone());
                    mutex
                },
                other => {
                    *state = other;
                    return;
                },
            }
        };

        mutex.wait();

        let mut state = self.state.lock();
        if matches!(&*state, NodeState::Disconnecting(current) if current.same_lock(&mutex)) {
            *state = NodeState::Disconnected;
        }
    }
}

impl<Id, I, P> Drop for Handler<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    fn drop(&mut self) {
        self.bus_disconnect();
    }
}

impl<Id, I, P> fmt::Debug for Handler<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("bus", &self.bus)
            .field("id", &self.bus_id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
