//! Shared recursive lock guarding dispatch at one address.
//!
//! [`HandlerMutex`] is a cheaply cloneable handle to a
//! `parking_lot::ReentrantMutex`. The handle is reference counted
//! independently of the address map entry that created it, so a thread that
//! captured it before the entry was erased can still lock it afterwards.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::sync::Arc;
use std::thread;

/// Guard returned by [`HandlerMutex::lock`].
pub type HandlerMutexGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// Reference-counted recursive mutex handle.
///
/// Cloning the handle shares the same underlying lock.
#[derive(Debug, Clone, Default)]
pub struct HandlerMutex {
    inner: Arc<ReentrantMutex<()>>,
}

impl HandlerMutex {
    /// Creates a handle to a fresh, unlocked mutex.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is held by the current thread.
    ///
    /// Re-locking from the thread that already owns it succeeds immediately.
    pub fn lock(&self) -> HandlerMutexGuard<'_> {
        self.inner.lock()
    }

    /// Attempts to acquire the lock without blocking.
    #[must_use]
    pub fn try_lock(&self) -> Option<HandlerMutexGuard<'_>> {
        self.inner.try_lock()
    }

    /// Locks and immediately unlocks.
    ///
    /// Returns once no other thread holds the lock at the moment of
    /// acquisition. Nothing stops another thread from taking it right after.
    pub fn wait(&self) {
        drop(self.inner.lock());
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    #[must_use]
    pub fn is_owned_by_current_thread(&self) -> bool {
        self.inner.is_owned_by_current_thread()
    }

    /// Returns `true` if both handles refer to the same lock.
    #[must_use]
    pub fn same_lock(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of live handles sharing this lock.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

/// Tries to acquire every mutex without blocking.
///
/// On success returns every guard, in input order. On failure releases
/// whatever was acquired.
///
/// # Errors
/// Returns the index of the first mutex found locked by another thread.
pub fn try_lock_range(mutexes: &[HandlerMutex]) -> Result<Vec<HandlerMutexGuard<'_>>, usize> {
    try_lock_cycle(mutexes, 0, mutexes.len())
}

/// Acquires every mutex in `mutexes` without deadlocking against other
/// threads locking overlapping sets.
///
/// Blocks on one mutex, then try-locks the rest. If any of them is busy,
/// everything is released and the next round blocks on the busy one.
/// Duplicate handles are fine since the locks are recursive.
///
/// Guards are returned in acquisition order, which is a rotation of the
/// input order.
pub fn lock_range(mutexes: &[HandlerMutex]) -> Vec<HandlerMutexGuard<'_>> {
    let len = mutexes.len();
    if len == 0 {
        return Vec::new();
    }

    let mut start = 0;
    loop {
        let head = mutexes[start].lock();
        match try_lock_cycle(mutexes, start + 1, len - 1) {
            Ok(rest) => {
                let mut guards = Vec::with_capacity(len);
                guards.push(head);
                guards.extend(rest);
                return guards;
            },
            Err(busy) => {
                drop(head);
                thread::yield_now();
                start = busy;
            },
        }
    }
}

fn try_lock_cycle(
    mutexes: &[HandlerMutex],
    from: usize,
    count: usize,
) -> Result<Vec<HandlerMutexGuard<'_>>, usize> {
    let len = mutexes.len();
    let mut guards = Vec::with_capacity(count);
    for offset in 0..count {
        let index = (from + offset) % len;
        match mutexes[index].try_lock() {
            Some(guard) => guards.push(guard),
            None => return Err(index),
        }
    }
    Ok(guards)
}
