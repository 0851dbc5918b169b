use crate::config::BusConfig;
use crate::context::Context;
use crate::error::BusError;
use crate::holder::NodeId;
use crate::mutex::{HandlerMutex, lock_range};
use crate::policy::{DefaultEventProcessing, EventProcessingPolicy};
use crate::queue::QueuedEvent;
use crate::router::Router;
use crate::{BusId, Interface};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// A synchronous event bus delivering events of interface `I` to handlers
/// connected at addresses of type `Id`.
///
/// `Bus` is a cheap handle: clones share the same context. The context is
/// created when the first handler, router or queued event arrives and is
/// torn down by [`Bus::shutdown`].
pub struct Bus<Id, I: ?Sized, P = DefaultEventProcessing> {
    shared: Arc<Shared<Id, I, P>>,
}

struct Shared<Id, I: ?Sized, P> {
    config: BusConfig,
    policy: P,
    context: OnceLock<Context<Id, I>>,
    queue: Mutex<VecDeque<QueuedEvent<Id, I>>>,
    next_node: AtomicU64,
}

impl<Id, I> Bus<Id, I, DefaultEventProcessing>
where
    Id: BusId,
    I: ?Sized + Interface,
{
    /// Creates a bus with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::from_parts(BusConfig::default(), DefaultEventProcessing)
    }

    /// Creates a bus with the given configuration.
    ///
    /// # Errors
    /// Returns [`BusError::InvalidConfiguration`] if `config` fails validation.
    pub fn with_config(config: BusConfig) -> Result<Self, BusError> {
        Self::with_policy(config, DefaultEventProcessing)
    }
}

impl<Id, I> Default for Bus<Id, I, DefaultEventProcessing>
where
    Id: BusId,
    I: ?Sized + Interface,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<Id, I, P> Bus<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    /// Creates a bus invoking handlers through `policy`.
    ///
    /// # Errors
    /// Returns [`BusError::InvalidConfiguration`] if `config` fails validation.
    ///
    /// # Examples
    /// ```rust
    /// use ebus::{Bus, BusConfig, CountingEventProcessing};
    ///
    /// # fn main() -> Result<(), ebus::BusError> {
    /// let bus: Bus<u8, dyn Fn(u8) + Send + Sync, _> =
    ///     Bus::with_policy(BusConfig::default(), CountingEventProcessing::default())?;
    /// bus.event(&1, |h| h(1));
    /// assert_eq!(bus.policy().invocations(), 0);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_policy(config: BusConfig, policy: P) -> Result<Self, BusError> {
        config.validate()?;
        Ok(Self::from_parts(config, policy))
    }

    fn from_parts(config: BusConfig, policy: P) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                policy,
                context: OnceLock::new(),
                queue: Mutex::new(VecDeque::new()),
                next_node: AtomicU64::new(1),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &BusConfig {
        &self.shared.config
    }

    #[must_use]
    pub fn policy(&self) -> &P {
        &self.shared.policy
    }

    /// Registers a router. Routers are consulted in registration order.
    ///
    /// # Errors
    /// Returns [`BusError::Shutdown`] if the bus was shut down.
    pub fn add_router(&self, router: Arc<dyn Router<Id, I>>) -> Result<(), BusError> {
        let context = self.context();
        let mut state = context.lock();
        if context.is_closed() {
            warn!(bus = %self.shared.config.name, "Router rejected: bus shut down");
            return Err(BusError::Shutdown {
                message: "cannot add a router".into(),
                context: Some(self.shared.config.name.clone().into()),
            });
        }
        state.routers.push(router);
        debug!(bus = %self.shared.config.name, routers = state.routers.len(), "Router added");
        Ok(())
    }

    /// Unregisters `router`, compared by pointer identity.
    ///
    /// Returns `true` if it was registered.
    pub fn remove_router(&self, router: &Arc<dyn Router<Id, I>>) -> bool {
        let Some(context) = self.existing_context() else {
            return false;
        };
        let mut state = context.lock();
        let before = state.routers.len();
        state.routers.retain(|r| !Arc::ptr_eq(r, router));
        before != state.routers.len()
    }

    /// Returns `true` if at least one handler is connected at `id`.
    #[must_use]
    pub fn has_handlers(&self, id: &Id) -> bool {
        self.handler_count(id) > 0
    }

    #[must_use]
    pub fn handler_count(&self, id: &Id) -> usize {
        self.existing_context()
            .map_or(0, |context| context.lock().addresses.find(id).map_or(0, |holder| holder.len()))
    }

    /// Number of occupied addresses.
    #[must_use]
    pub fn address_count(&self) -> usize {
        self.existing_context().map_or(0, |context| context.lock().addresses.len())
    }

    /// Closes the bus.
    ///
    /// Unlinks every handler, drops routers and queued events, then waits
    /// for every dispatch still running. Afterwards dispatch is a no-op and
    /// connecting fails with [`BusError::Shutdown`]. A broadcast in flight
    /// skips the addresses it has not reached yet.
    ///
    /// Returns the number of addresses that were closed. Only the first call
    /// does any work.
    pub fn shutdown(&self) -> usize {
        let context = self.context();
        let (holders, routers, queued) = {
            let mut state = context.lock();
            if !context.close(&mut state) {
                return 0;
            }
            let queued = std::mem::take(&mut *self.shared.queue.lock());
            (state.addresses.drain(), std::mem::take(&mut state.routers), queued)
        };

        let mutexes: Vec<HandlerMutex> = holders.iter().map(|h| h.handler_mutex().clone()).collect();
        drop(lock_range(&mutexes));

        let count = holders.len();
        info!(
            bus = %self.shared.config.name,
            addresses = count,
            routers = routers.len(),
            dropped_events = queued.len(),
            "Bus shut down"
        );
        count
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.existing_context().is_some_and(Context::is_closed)
    }

    /// Context of this bus, created on first use.
    pub(crate) fn context(&self) -> &Context<Id, I> {
        self.shared.context.get_or_init(|| {
            debug!(bus = %self.shared.config.name, "Context created");
            Context::new(self.shared.config.initial_capacity)
        })
    }

    pub(crate) fn existing_context(&self) -> Option<&Context<Id, I>> {
        self.shared.context.get()
    }

    pub(crate) fn queue(&self) -> &Mutex<VecDeque<QueuedEvent<Id, I>>> {
        &self.shared.queue
    }

    pub(crate) fn next_node_id(&self) -> NodeId {
        self.shared.next_node.fetch_add(1, Ordering::Relaxed)
    }
}

impl<Id, I: ?Sized, P> Clone for Bus<Id, I, P> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<Id, I: ?Sized, P> fmt::Debug for Bus<Id, I, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.shared.config.name)
            .field("context", &self.shared.context.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::EventFn;

    type TestBus = Bus<u32, dyn Fn(u32) + Send + Sync>;

    struct Swallow;

    impl Router<u32, dyn Fn(u32) + Send + Sync> for Swallow {
        fn route_event(
            &self,
            _id: Option<&u32>,
            _is_queued: bool,
            _is_reverse: bool,
            _event: &EventFn<'_, dyn Fn(u32) + Send + Sync>,
        ) -> bool {
            true
        }
    }

    #[test]
    fn context_is_created_lazily() {
        let bus = TestBus::new();
        assert!(bus.existing_context().is_none());
        assert_eq!(bus.address_count(), 0);
        assert!(!bus.has_handlers(&1));
        assert!(bus.existing_context().is_none());

        bus.context();
        assert!(bus.existing_context().is_some());
    }

    #[test]
    fn clones_share_the_context() {
        let bus = TestBus::new();
        let other = bus.clone();
        assert!(std::ptr::eq(bus.context(), other.context()));
    }

    #[test]
    fn node_ids_are_unique() {
        let bus = TestBus::new();
        let a = bus.next_node_id();
        let b = bus.clone().next_node_id();
        assert_ne!(a, b);
    }

    #[test]
    fn with_config_rejects_invalid_values() {
        let config = BusConfig { queue_capacity: 0, ..BusConfig::default() };
        let err = TestBus::with_config(config).unwrap_err();
        assert!(matches!(err, BusError::InvalidConfiguration { .. }));
    }

    #[test]
    fn routers_are_removed_by_identity() {
        let bus = TestBus::new();
        let router: Arc<dyn Router<u32, dyn Fn(u32) + Send + Sync>> = Arc::new(Swallow);
        let other: Arc<dyn Router<u32, dyn Fn(u32) + Send + Sync>> = Arc::new(Swallow);

        bus.add_router(router.clone()).unwrap();
        assert!(!bus.remove_router(&other));
        assert!(bus.remove_router(&router));
        assert!(!bus.remove_router(&router));
    }

    #[test]
    fn shutdown_runs_once_and_rejects_routers() {
        let bus = TestBus::new();
        assert!(!bus.is_shut_down());
        assert_eq!(bus.shutdown(), 0);
        assert!(bus.is_shut_down());
        assert_eq!(bus.shutdown(), 0);

        let err = bus.add_router(Arc::new(Swallow)).unwrap_err();
        assert!(matches!(err, BusError::Shutdown { .. }));
    }
}
