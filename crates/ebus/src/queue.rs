use crate::bus::Bus;
use crate::error::BusError;
use crate::policy::EventProcessingPolicy;
use crate::{BusId, Interface};
use std::fmt;
use tracing::{trace, warn};

/// An event waiting for [`Bus::execute_queued_events`].
pub(crate) struct QueuedEvent<Id, I: ?Sized> {
    id: Id,
    event: Box<dyn Fn(&I) + Send>,
}

impl<Id: fmt::Debug, I: ?Sized> fmt::Debug for QueuedEvent<Id, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<Id, I, P> Bus<Id, I, P>
where
    Id: BusId,
    I: ?Sized + Interface,
    P: EventProcessingPolicy<I>,
{
    /// Defers `event` for address `id` until [`Bus::execute_queued_events`].
    ///
    /// Routers are consulted now with `is_queued = true`; an event a router
    /// handles is not queued. Routers see the event again, as a regular one,
    /// when it is executed.
    ///
    /// # Errors
    /// Returns [`BusError::Shutdown`] if the bus was shut down, or
    /// [`BusError::QueueFull`] if `queue_capacity` events are already pending.
    pub fn queue_event<F>(&self, id: Id, event: F) -> Result<(), BusError>
    where
        F: Fn(&I) + Send + 'static,
    {
        let context = self.context();
        let state = context.lock();
        if context.is_closed() {
            warn!(?id, "Queued event rejected: bus shut down");
            return Err(BusError::Shutdown {
                message: "cannot queue an event".into(),
                context: Some(format!("{id:?}").into()),
            });
        }
        if state.route(Some(&id), true, false, &event) {
            return Ok(());
        }

        let mut queue = self.queue().lock();
        let capacity = self.config().queue_capacity;
        if queue.len() >= capacity {
            warn!(?id, capacity, "Queued event rejected: queue full");
            return Err(BusError::QueueFull {
                message: format!("{capacity} events pending").into(),
                context: Some(format!("{id:?}").into()),
            });
        }
        trace!(?id, pending = queue.len() + 1, "Event queued");
        queue.push_back(QueuedEvent { id, event: Box::new(event) });
        Ok(())
    }

    /// Dispatches every event queued so far, in queue order, on the calling
    /// thread.
    ///
    /// Events queued while the batch runs wait for the next call. Returns the
    /// number of events executed.
    pub fn execute_queued_events(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue().lock());
        let count = batch.len();
        for queued in batch {
            self.event(&queued.id, &*queued.event);
        }
        if count > 0 {
            trace!(count, "Queued events executed");
        }
        count
    }

    /// Drops every pending event. Returns how many were dropped.
    pub fn clear_queued_events(&self) -> usize {
        let batch = std::mem::take(&mut *self.queue().lock());
        batch.len()
    }

    #[must_use]
    pub fn queued_event_count(&self) -> usize {
        self.queue().lock().len()
    }
}
