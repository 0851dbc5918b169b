use crate::holder::AddressMap;
use crate::router::Router;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// State guarded by the context lock.
pub(crate) struct ContextState<Id, I: ?Sized> {
    pub(crate) addresses: AddressMap<Id, I>,
    pub(crate) routers: Vec<Arc<dyn Router<Id, I>>>,
}

impl<Id, I> ContextState<Id, I>
where
    Id: Eq + Hash + fmt::Debug,
    I: ?Sized,
{
    /// Offers the event to every router in order.
    ///
    /// Returns `true` as soon as one of them handles it.
    pub(crate) fn route(
        &self,
        id: Option<&Id>,
        is_queued: bool,
        is_reverse: bool,
        event: &dyn Fn(&I),
    ) -> bool {
        let routed = self.routers.iter().any(|router| router.route_event(id, is_queued, is_reverse, event));
        if routed {
            debug!(?id, is_queued, is_reverse, "Event routed");
        }
        routed
    }
}

/// Runtime state of one bus: the address map, the routers and the
/// closed flag.
pub(crate) struct Context<Id, I: ?Sized> {
    state: Mutex<ContextState<Id, I>>,
    // only written with `state` locked
    closed: AtomicBool,
}

impl<Id, I> Context<Id, I>
where
    Id: Eq + Hash + fmt::Debug,
    I: ?Sized,
{
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(ContextState {
                addresses: AddressMap::with_capacity(capacity),
                routers: Vec::new(),
            }),
            closed: AtomicBool::new(false),
        }
    }

    /// Takes the context lock.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ContextState<Id, I>> {
        self.state.lock()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the context closed. The caller must hold the context lock.
    ///
    /// Returns `false` if it was already closed.
    pub(crate) fn close(&self, _state: &mut ContextState<Id, I>) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

impl<Id, I: ?Sized> fmt::Debug for Context<Id, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("closed", &self.closed.load(Ordering::Relaxed)).finish_non_exhaustive()
    }
}
