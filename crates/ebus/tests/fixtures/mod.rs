#![allow(dead_code)]

use ebus::{Bus, Handler, MultiHandler};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// Handler interface used across the integration tests.
pub trait Counter: Send + Sync {
    fn increment(&self);
    fn count(&self) -> u32;
    fn name(&self) -> &'static str;
}

pub type CounterBus = Bus<u32, dyn Counter>;
pub type CounterHandler = Handler<u32, dyn Counter>;
pub type CounterMultiHandler = MultiHandler<u32, dyn Counter>;

/// Shared record of invocation order.
pub type Log = Arc<Mutex<Vec<&'static str>>>;

type Hook = Box<dyn Fn() + Send + Sync>;

/// Counting handler that logs every invocation and can run a hook from
/// inside its callback.
pub struct Recorder {
    name: &'static str,
    count: AtomicU32,
    log: Log,
    hook: OnceLock<Hook>,
    retired: AtomicBool,
    late_calls: AtomicU32,
}

impl Recorder {
    pub fn new(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            count: AtomicU32::new(0),
            log: Arc::clone(log),
            hook: OnceLock::new(),
            retired: AtomicBool::new(false),
            late_calls: AtomicU32::new(0),
        })
    }

    /// Runs `hook` after every increment. Can be set once.
    pub fn on_increment(&self, hook: impl Fn() + Send + Sync + 'static) {
        assert!(self.hook.set(Box::new(hook)).is_ok(), "hook already set");
    }

    /// Marks the recorder as disconnected; later invocations count as late.
    pub fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }

    pub fn late_calls(&self) -> u32 {
        self.late_calls.load(Ordering::SeqCst)
    }
}

impl Counter for Recorder {
    fn increment(&self) {
        if self.retired.load(Ordering::SeqCst) {
            self.late_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.count.fetch_add(1, Ordering::SeqCst);
        self.log.lock().push(self.name);
        if let Some(hook) = self.hook.get() {
            hook();
        }
    }

    fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

pub fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<&'static str> {
    log.lock().clone()
}

pub fn clear(log: &Log) {
    log.lock().clear();
}

pub fn as_counter(recorder: &Arc<Recorder>) -> Arc<dyn Counter> {
    Arc::clone(recorder) as Arc<dyn Counter>
}

/// Creates a handler for `recorder` connected at `id`.
pub fn connect(bus: &CounterBus, id: u32, recorder: &Arc<Recorder>) -> CounterHandler {
    let handler = Handler::new(bus, as_counter(recorder));
    handler.bus_connect(id).expect("connect failed");
    handler
}
