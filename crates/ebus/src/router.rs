/// Event as seen by a router: the operation the bus would run on each handler.
pub type EventFn<'a, I> = dyn Fn(&I) + 'a;

/// Intercepts events before they reach the handlers of an address.
///
/// Routers run with the bus context lock held, in registration order. They
/// may forward the event elsewhere (another bus, a log, a network link) but
/// must not call back into the bus that invoked them.
///
/// # Examples
/// ```rust
/// use ebus::{Bus, EventFn, Router};
/// use std::sync::Arc;
///
/// trait Ping: Send + Sync {
///     fn ping(&self);
/// }
///
/// /// Swallows every event sent to address 0.
/// struct Mute;
///
/// impl Router<u32, dyn Ping> for Mute {
///     fn route_event(
///         &self,
///         id: Option<&u32>,
///         _is_queued: bool,
///         _is_reverse: bool,
///         _event: &EventFn<'_, dyn Ping>,
///     ) -> bool {
///         id == Some(&0)
///     }
/// }
///
/// let bus: Bus<u32, dyn Ping> = Bus::new();
/// bus.add_router(Arc::new(Mute)).unwrap();
/// bus.event(&0, |h| h.ping());
/// ```
pub trait Router<Id, I: ?Sized>: Send + Sync {
    /// Called before dispatch.
    ///
    /// `id` is `None` for a broadcast. `is_queued` is `true` when the event
    /// is being queued rather than dispatched. `is_reverse` is `true` for
    /// reverse-order dispatch.
    ///
    /// Returning `true` stops processing: later routers and the handlers at
    /// the address are skipped.
    fn route_event(
        &self,
        id: Option<&Id>,
        is_queued: bool,
        is_reverse: bool,
        event: &EventFn<'_, I>,
    ) -> bool;
}
