use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ebus::{Bus, Handler, MultiHandler};
use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

trait Sink: Send + Sync {
    fn accept(&self, value: u64);
    fn total(&self) -> u64;
}

#[derive(Default)]
struct Total(AtomicU64);

impl Sink for Total {
    fn accept(&self, value: u64) {
        self.0.fetch_add(value, Ordering::Relaxed);
    }

    fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

fn sink() -> Arc<dyn Sink> {
    Arc::new(Total::default())
}

fn bench_event(c: &mut Criterion) {
    let mut group = c.benchmark_group("event");

    for handlers in [1usize, 8, 64] {
        let bus: Bus<u32, dyn Sink> = Bus::new();
        let connected: Vec<_> = (0..handlers)
            .map(|_| {
                let handler = Handler::new(&bus, sink());
                handler.bus_connect(1).unwrap();
                handler
            })
            .collect();

        group.throughput(Throughput::Elements(handlers as u64));
        group.bench_with_input(BenchmarkId::new("event", handlers), &bus, |b, bus| {
            b.iter(|| bus.event(black_box(&1), |h| h.accept(1)));
        });
        group.bench_with_input(BenchmarkId::new("event_aggregate", handlers), &bus, |b, bus| {
            b.iter(|| black_box(bus.event_aggregate(&1, |h| h.total())));
        });
        drop(connected);
    }

    let bus: Bus<u32, dyn Sink> = Bus::new();
    group.bench_function("event_unknown_address", |b| {
        b.iter(|| bus.event(black_box(&404), |h| h.accept(1)));
    });

    group.finish();
}

fn bench_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("connect");
    let bus: Bus<u32, dyn Sink> = Bus::new();
    let handler = sink();

    group.bench_function("connect_disconnect", |b| {
        b.iter(|| {
            let h = Handler::new(&bus, Arc::clone(&handler));
            h.bus_connect(black_box(7)).unwrap();
            h.bus_disconnect();
        });
    });

    for addresses in [4u32, 32] {
        group.bench_with_input(BenchmarkId::new("multi_disconnect_all", addresses), &addresses, |b, &n| {
            b.iter(|| {
                let multi = MultiHandler::new(&bus, Arc::clone(&handler));
                for id in 0..n {
                    multi.bus_connect(id).unwrap();
                }
                multi.bus_disconnect();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_event, bench_connect);
criterion_main!(benches);
