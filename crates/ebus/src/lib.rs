//! # ebus
//!
//! A synchronous, thread-safe, in-process event bus with per-address
//! dispatch locking.
//!
//! ## Overview
//!
//! Handlers connect to an address (any [`BusId`]) on a [`Bus`]. Publishers
//! call [`Bus::event`] with an address and an operation; the operation runs
//! on every handler connected at that address, in connection order, on the
//! publishing thread.
//!
//! ## Guarantees
//!
//! * **Per-address exclusion**: dispatches to one address are serialised by a
//!   recursive lock, so handlers may re-enter the bus from their callbacks.
//! * **Safe teardown**: [`Handler::bus_disconnect`] returns only after any
//!   dispatch in flight at that address has finished, so the handler may be
//!   destroyed right after.
//! * **Short critical sections**: the bus-wide context lock is never held
//!   while handler code runs.
//!
//! # Example
//!
//! ```rust
//! use ebus::{Bus, Handler};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//!
//! trait Tick: Send + Sync {
//!     fn on_tick(&self, n: u32);
//! }
//!
//! #[derive(Default)]
//! struct Total(AtomicU32);
//!
//! impl Tick for Total {
//!     fn on_tick(&self, n: u32) {
//!         self.0.fetch_add(n, Ordering::Relaxed);
//!     }
//! }
//!
//! # fn main() -> Result<(), ebus::BusError> {
//! let bus: Bus<u32, dyn Tick> = Bus::new();
//! let total = Arc::new(Total::default());
//!
//! let handler = Handler::new(&bus, total.clone() as Arc<dyn Tick>);
//! handler.bus_connect(42)?;
//!
//! bus.event(&42, |h| h.on_tick(5));
//! handler.bus_disconnect();
//! bus.event(&42, |h| h.on_tick(5));
//!
//! assert_eq!(total.0.load(Ordering::Relaxed), 5);
//! # Ok(())
//! # }
//! ```

mod bus;
pub mod config;
mod context;
mod dispatch;
mod error;
mod handler;
mod holder;
pub mod mutex;
mod multi_handler;
mod policy;
mod queue;
mod router;

pub use bus::Bus;
pub use crate::config::{BusConfig, load_config};
pub use error::{BusError, BusErrorExt};
pub use handler::{ConnectionState, Handler};
pub use multi_handler::MultiHandler;
pub use mutex::{HandlerMutex, lock_range, try_lock_range};
pub use policy::{CountingEventProcessing, DefaultEventProcessing, EventProcessingPolicy};
pub use router::{EventFn, Router};

use std::fmt::Debug;
use std::hash::Hash;

/// Key identifying one address on a bus.
///
/// Implemented for every type that fits; use `()` for a bus with a single
/// address.
pub trait BusId: Clone + Eq + Hash + Debug + Send + Sync + 'static {}
impl<T: Clone + Eq + Hash + Debug + Send + Sync + 'static> BusId for T {}

/// Bound shared by every handler interface type, usually a `dyn Trait`.
pub trait Interface: Send + Sync + 'static {}
impl<T: ?Sized + Send + Sync + 'static> Interface for T {}
