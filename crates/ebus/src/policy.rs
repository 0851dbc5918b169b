use std::sync::atomic::{AtomicU64, Ordering};

/// Strategy invoking an event on one handler.
///
/// Every dispatch variant of [`Bus`](crate::Bus) goes through the policy of
/// the bus, with the address lock held. The default methods invoke the event
/// directly.
pub trait EventProcessingPolicy<I: ?Sized>: Send + Sync + 'static {
    fn call(&self, handler: &I, event: &dyn Fn(&I)) {
        event(handler);
    }

    fn call_result<R>(&self, handler: &I, event: &dyn Fn(&I) -> R) -> R {
        event(handler)
    }
}

/// Invokes events directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEventProcessing;

impl<I: ?Sized> EventProcessingPolicy<I> for DefaultEventProcessing {}

/// Invokes events directly and counts every handler invocation.
#[derive(Debug, Default)]
pub struct CountingEventProcessing {
    invocations: AtomicU64,
}

impl CountingEventProcessing {
    #[must_use]
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl<I: ?Sized> EventProcessingPolicy<I> for CountingEventProcessing {
    fn call(&self, handler: &I, event: &dyn Fn(&I)) {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        event(handler);
    }

    fn call_result<R>(&self, handler: &I, event: &dyn Fn(&I) -> R) -> R {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        event(handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn default_policy_invokes_directly() {
        let hits = Cell::new(0);
        DefaultEventProcessing.call("x", &|s: &str| hits.set(hits.get() + s.len()));
        assert_eq!(hits.get(), 1);
        assert_eq!(DefaultEventProcessing.call_result("abc", &|s: &str| s.len()), 3);
    }

    #[test]
    fn counting_policy_counts_both_paths() {
        let policy = CountingEventProcessing::default();
        policy.call("x", &|_: &str| {});
        let len = policy.call_result("abcd", &|s: &str| s.len());
        assert_eq!(len, 4);
        assert_eq!(policy.invocations(), 2);
    }
}
