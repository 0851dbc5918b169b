//! Synchronous dispatch.
//!
//! Every variant follows the same discipline: take the context lock, let the
//! routers look at the event, copy the address's lock handle and handler
//! list, release the context lock, then run the handlers with the address
//! lock held. Handlers connected after the copy is taken are not invoked.
//! Handlers unlinked before the address lock is taken are skipped; those
//! unlinked after it still run, and their disconnect waits for this dispatch
//! to finish.

use crate::bus::Bus;
use crate::holder::Snapshot;
use crate::policy::EventProcessingPolicy;
use crate::{BusId, Interface};
use tracing::trace;

impl<Id, I, P> Bus<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    /// Invokes `event` on every handler connected at `id`, in connection order.
    ///
    /// Does nothing if no handler is connected or a router handled the event.
    /// A panic raised by a handler propagates to the caller; the address lock
    /// is released during unwinding.
    pub fn event<F>(&self, id: &Id, event: F)
    where
        F: Fn(&I),
    {
        let Some(snapshot) = self.snapshot(id, false, &event) else {
            return;
        };
        let locked = snapshot.lock();
        trace!(?id, handlers = locked.handlers.len(), "Event dispatched");

        for handler in &locked.handlers {
            self.policy().call(handler, &event);
        }
    }

    /// Like [`Bus::event`], but invokes handlers in reverse connection order.
    pub fn event_reverse<F>(&self, id: &Id, event: F)
    where
        F: Fn(&I),
    {
        let Some(snapshot) = self.snapshot(id, true, &event) else {
            return;
        };
        let locked = snapshot.lock();
        trace!(?id, handlers = locked.handlers.len(), "Event dispatched in reverse");

        for handler in locked.handlers.iter().rev() {
            self.policy().call(handler, &event);
        }
    }

    /// Invokes `event` on every handler at `id` and returns the result of the
    /// last one, or `None` if nothing was invoked.
    pub fn event_result<F, R>(&self, id: &Id, event: F) -> Option<R>
    where
        F: Fn(&I) -> R,
    {
        let route = |handler: &I| {
            event(handler);
        };
        let snapshot = self.snapshot(id, false, &route)?;
        let locked = snapshot.lock();
        trace!(?id, handlers = locked.handlers.len(), "Event dispatched for result");

        locked.handlers.iter().fold(None, |_, handler| Some(self.policy().call_result(handler, &event)))
    }

    /// Invokes `event` on every handler at `id` and collects every result in
    /// dispatch order.
    pub fn event_aggregate<F, R>(&self, id: &Id, event: F) -> Vec<R>
    where
        F: Fn(&I) -> R,
    {
        let route = |handler: &I| {
            event(handler);
        };
        let Some(snapshot) = self.snapshot(id, false, &route) else {
            return Vec::new();
        };
        let locked = snapshot.lock();
        trace!(?id, handlers = locked.handlers.len(), "Event dispatched for aggregate");

        locked.handlers.iter().map(|handler| self.policy().call_result(handler, &event)).collect()
    }

    /// Invokes `event` on every handler at every address.
    ///
    /// All addresses are copied under one context lock, then dispatched one
    /// at a time, each under its own address lock. A handler disconnected
    /// before the broadcast reaches its address is skipped. Routers see
    /// `id = None`.
    pub fn broadcast<F>(&self, event: F)
    where
        F: Fn(&I),
    {
        let Some(context) = self.existing_context() else {
            return;
        };
        let snapshots = {
            let state = context.lock();
            if state.route(None, false, false, &event) {
                return;
            }
            state.addresses.snapshots()
        };
        trace!(addresses = snapshots.len(), "Event broadcast");

        for snapshot in &snapshots {
            let locked = snapshot.lock();
            for handler in &locked.handlers {
                self.policy().call(handler, &event);
            }
        }
    }

    /// Copies the address at `id` under the context lock.
    ///
    /// Returns `None` when a router handled the event or there is nothing to
    /// invoke.
    fn snapshot(&self, id: &Id, is_reverse: bool, event: &dyn Fn(&I)) -> Option<Snapshot<I>> {
        let context = self.existing_context()?;
        let state = context.lock();
        if state.route(Some(id), false, is_reverse, event) {
            return None;
        }
        let snapshot = state.addresses.find(id)?.snapshot();
        drop(state);

        (!snapshot.is_empty()).then_some(snapshot)
    }
}
