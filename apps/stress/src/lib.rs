//! # ebus stress harness
//!
//! Runs worker threads against one shared [`Bus`]. Each worker repeatedly
//! connects a fresh handler, dispatches to it and its neighbours, disconnects
//! it and retires it. A retired handler that is invoked again is a violation
//! of the disconnect guarantee.

pub mod args;

pub use args::Cli;

use anyhow::{Context, anyhow, ensure};
use ebus::{Bus, BusConfig, CountingEventProcessing, Handler, MultiHandler};
use ebus_logger::LogSettings;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Top-level configuration of the harness.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    pub bus: BusConfig,
    pub logging: LogSettings,
    pub workload: WorkloadConfig,
}

/// Shape of the generated load.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    pub threads: usize,
    pub addresses: u32,
    pub iterations: usize,
    /// Every n-th cycle uses a multi-handler spanning two addresses.
    pub multi_every: usize,
    /// Every n-th cycle also goes through the deferred queue.
    pub queue_every: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self { threads: 4, addresses: 8, iterations: 1_000, multi_every: 4, queue_every: 3 }
    }
}

impl WorkloadConfig {
    /// # Errors
    /// Fails if any count is zero.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.threads > 0, "workload.threads must be > 0");
        ensure!(self.addresses > 0, "workload.addresses must be > 0");
        ensure!(self.multi_every > 0, "workload.multi_every must be > 0");
        ensure!(self.queue_every > 0, "workload.queue_every must be > 0");
        Ok(())
    }
}

/// Handler interface driven by the workload.
pub trait Target: Send + Sync {
    fn hit(&self);
}

struct Tracked {
    retired: AtomicBool,
    violations: Arc<AtomicU64>,
}

impl Tracked {
    fn new(violations: &Arc<AtomicU64>) -> Arc<Self> {
        Arc::new(Self { retired: AtomicBool::new(false), violations: Arc::clone(violations) })
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::SeqCst);
    }
}

impl Target for Tracked {
    fn hit(&self) {
        if self.retired.load(Ordering::SeqCst) {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
    }
}

type StressBus = Bus<u32, dyn Target, CountingEventProcessing>;

/// Outcome of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    pub cycles: u64,
    pub events: u64,
    pub invocations: u64,
    pub violations: u64,
    pub elapsed: Duration,
}

/// Runs the workload described by `config` to completion.
///
/// # Errors
/// Returns an error if the configuration is invalid, a worker fails to
/// connect or a worker panics.
pub fn run(config: &StressConfig) -> anyhow::Result<Report> {
    let workload = &config.workload;
    workload.validate()?;
    let bus: StressBus = Bus::with_policy(config.bus.clone(), CountingEventProcessing::default())
        .context("Failed to create bus")?;

    info!(
        bus = %config.bus.name,
        threads = workload.threads,
        addresses = workload.addresses,
        iterations = workload.iterations,
        "Stress run started"
    );

    let violations = Arc::new(AtomicU64::new(0));
    let events = AtomicU64::new(0);
    let started = Instant::now();

    thread::scope(|scope| -> anyhow::Result<()> {
        let workers: Vec<_> = (0..workload.threads)
            .map(|worker| {
                let (bus, violations, events) = (&bus, &violations, &events);
                scope.spawn(move || worker_loop(worker, workload, bus, violations, events))
            })
            .collect();

        for (worker, handle) in workers.into_iter().enumerate() {
            handle.join().map_err(|_| anyhow!("worker {worker} panicked"))??;
        }
        Ok(())
    })?;

    let closed = bus.shutdown();
    let report = Report {
        cycles: (workload.threads * workload.iterations) as u64,
        events: events.load(Ordering::Relaxed),
        invocations: bus.policy().invocations(),
        violations: violations.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    };

    if report.violations > 0 {
        warn!(violations = report.violations, "Handlers invoked after disconnect");
    }
    info!(
        cycles = report.cycles,
        events = report.events,
        invocations = report.invocations,
        violations = report.violations,
        addresses_closed = closed,
        elapsed_ms = report.elapsed.as_millis(),
        "Stress run finished"
    );
    Ok(report)
}

fn worker_loop(
    worker: usize,
    workload: &WorkloadConfig,
    bus: &StressBus,
    violations: &Arc<AtomicU64>,
    events: &AtomicU64,
) -> anyhow::Result<()> {
    let addresses = workload.addresses;
    let mut dispatched = 0u64;

    for cycle in 0..workload.iterations {
        let id = u32::try_from((worker + cycle) % addresses as usize)?;
        let neighbour = (id + 1) % addresses;
        let tracked = Tracked::new(violations);
        let handler: Arc<dyn Target> = tracked.clone();

        if cycle % workload.multi_every == 0 {
            let multi = MultiHandler::new(bus, handler);
            multi.bus_connect(id)?;
            multi.bus_connect(neighbour)?;
            bus.event(&id, |h| h.hit());
            bus.event(&neighbour, |h| h.hit());
            dispatched += 2;
            multi.bus_disconnect();
        } else {
            let single = Handler::new(bus, handler);
            single.bus_connect(id)?;
            bus.event(&id, |h| h.hit());
            bus.event_reverse(&neighbour, |h| h.hit());
            dispatched += 2;
            if cycle % workload.queue_every == 0 {
                // a full queue only means other workers are ahead
                if bus.queue_event(id, |h| h.hit()).is_ok() {
                    dispatched += 1;
                }
                bus.execute_queued_events();
            }
            single.bus_disconnect();
        }
        tracked.retire();

        // anything reaching the retired handler from here on is a violation
        bus.event(&id, |h| h.hit());
        dispatched += 1;
    }

    events.fetch_add(dispatched, Ordering::Relaxed);
    debug!(worker, events = dispatched, "Worker finished");
    Ok(())
}
