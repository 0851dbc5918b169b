use crate::mutex::{HandlerMutex, HandlerMutexGuard};
use fxhash::{FxBuildHasher, FxHashMap};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Bus-unique identifier of one connection.
pub(crate) type NodeId = u64;

/// What a connected handler keeps about one of its connections.
#[derive(Debug, Clone)]
pub(crate) struct NodeLink {
    pub(crate) node: NodeId,
    pub(crate) handler_mutex: HandlerMutex,
}

/// Cleared, under the context lock, when the entry is unlinked.
type Linked = Arc<AtomicBool>;

struct HandlerEntry<I: ?Sized> {
    node: NodeId,
    handler: Arc<I>,
    linked: Linked,
}

impl<I: ?Sized> HandlerEntry<I> {
    fn unlink(&self) {
        self.linked.store(false, Ordering::Release);
    }
}

/// Handlers connected at one address plus the lock serialising dispatch to them.
pub(crate) struct HandlerHolder<I: ?Sized> {
    handlers: Vec<HandlerEntry<I>>,
    handler_mutex: HandlerMutex,
}

/// Copy of one address taken under the context lock.
///
/// Only valid for dispatch through [`Snapshot::lock`]: handlers unlinked
/// between the copy and the address lock must be skipped, since their
/// disconnect may already have found the lock free and returned.
pub(crate) struct Snapshot<I: ?Sized> {
    mutex: HandlerMutex,
    entries: Vec<(Arc<I>, Linked)>,
}

/// A snapshot with its address lock held.
pub(crate) struct LockedSnapshot<'a, I: ?Sized> {
    pub(crate) handlers: Vec<&'a Arc<I>>,
    _guard: HandlerMutexGuard<'a>,
}

impl<I: ?Sized> Snapshot<I> {
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Takes the address lock and keeps the handlers still linked.
    ///
    /// Linkage is read once, here. A handler unlinked later by this thread,
    /// from inside a callback, still receives the event in flight; one
    /// unlinked by another thread is waited for by its disconnect.
    pub(crate) fn lock(&self) -> LockedSnapshot<'_, I> {
        let guard = self.mutex.lock();
        debug_assert!(self.mutex.is_owned_by_current_thread());
        let handlers = self
            .entries
            .iter()
            .filter(|(_, linked)| linked.load(Ordering::Acquire))
            .map(|(handler, _)| handler)
            .collect();
        LockedSnapshot { handlers, _guard: guard }
    }
}

impl<I: ?Sized> HandlerHolder<I> {
    fn new() -> Self {
        Self { handlers: Vec::new(), handler_mutex: HandlerMutex::new() }
    }

    /// Appends a handler; dispatch order is append order.
    pub(crate) fn push(&mut self, node: NodeId, handler: Arc<I>) -> NodeLink {
        self.handlers.push(HandlerEntry { node, handler, linked: Arc::new(AtomicBool::new(true)) });
        NodeLink { node, handler_mutex: self.handler_mutex.clone() }
    }

    fn remove(&mut self, node: NodeId) -> bool {
        let Some(index) = self.handlers.iter().position(|entry| entry.node == node) else {
            return false;
        };
        // keep the relative order of the remaining handlers
        self.handlers.remove(index).unlink();
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn handler_mutex(&self) -> &HandlerMutex {
        &self.handler_mutex
    }

    pub(crate) fn snapshot(&self) -> Snapshot<I> {
        Snapshot {
            mutex: self.handler_mutex.clone(),
            entries: self
                .handlers
                .iter()
                .map(|entry| (Arc::clone(&entry.handler), Arc::clone(&entry.linked)))
                .collect(),
        }
    }
}

impl<I: ?Sized> fmt::Debug for HandlerHolder<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerHolder")
            .field("handlers", &self.handlers.len())
            .field("handler_mutex", &self.handler_mutex)
            .finish()
    }
}

/// Address map of one bus context.
///
/// Every method must be called with the context lock held.
pub(crate) struct AddressMap<Id, I: ?Sized> {
    holders: FxHashMap<Id, HandlerHolder<I>>,
}

impl<Id, I> AddressMap<Id, I>
where
    Id: Eq + Hash + fmt::Debug,
    I: ?Sized,
{
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self { holders: FxHashMap::with_capacity_and_hasher(capacity, FxBuildHasher::default()) }
    }

    pub(crate) fn find(&self, id: &Id) -> Option<&HandlerHolder<I>> {
        self.holders.get(id)
    }

    /// Returns the holder at `id`, creating it with a fresh mutex if absent.
    pub(crate) fn create_or_get(&mut self, id: Id) -> &mut HandlerHolder<I> {
        self.holders.entry(id).or_insert_with_key(|id| {
            debug!(?id, "Address created");
            HandlerHolder::new()
        })
    }

    /// Erases the holder at `id` if no handler is left.
    pub(crate) fn remove_if_empty(&mut self, id: &Id) -> bool {
        if self.holders.get(id).is_some_and(HandlerHolder::is_empty) {
            self.holders.remove(id);
            debug!(?id, "Address removed");
            return true;
        }
        false
    }

    /// Unlinks connection `node` from `id`, dropping the holder when it empties.
    ///
    /// Returns `false` when the connection was already gone.
    pub(crate) fn disconnect_internal(&mut self, id: &Id, node: NodeId) -> bool {
        let Some(holder) = self.holders.get_mut(id) else {
            return false;
        };
        let removed = holder.remove(node);
        if removed {
            self.remove_if_empty(id);
        }
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.holders.len()
    }

    pub(crate) fn snapshots(&self) -> Vec<Snapshot<I>> {
        self.holders.values().map(HandlerHolder::snapshot).collect()
    }

    /// Removes every holder, unlinking all of their handlers.
    pub(crate) fn drain(&mut self) -> Vec<HandlerHolder<I>> {
        self.holders
            .drain()
            .map(|(_, holder)| {
                holder.handlers.iter().for_each(HandlerEntry::unlink);
                holder
            })
            .collect()
    }
}

impl<Id: fmt::Debug, I: ?Sized> fmt::Debug for AddressMap<Id, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.holders.iter()).finish()
    }
}
