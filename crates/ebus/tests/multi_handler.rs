mod fixtures;

use ebus::MultiHandler;
use fixtures::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

#[test]
fn disconnect_all_removes_every_connection() {
    let bus = CounterBus::new();
    let log = new_log();
    let recorder = Recorder::new("multi", &log);
    let other = Recorder::new("other", &log);
    let _other = connect(&bus, 3, &other);

    let multi = MultiHandler::new(&bus, as_counter(&recorder));
    for id in 0..8 {
        multi.bus_connect(id).unwrap();
    }
    assert_eq!(bus.address_count(), 8);

    multi.bus_disconnect();
    assert!(multi.connected_ids().is_empty());
    assert_eq!(bus.address_count(), 1, "address shared with another handler stays");

    bus.broadcast(|h| h.increment());
    assert_eq!(entries(&log), ["other"]);
}

#[test]
fn no_dispatch_observes_the_handler_after_disconnect_all() {
    const ADDRESSES: u32 = 6;

    let bus = CounterBus::new();
    let log = new_log();
    let stop = Arc::new(AtomicBool::new(false));

    let dispatchers: Vec<_> = (0..3u32)
        .map(|t| {
            let (bus, stop) = (bus.clone(), Arc::clone(&stop));
            thread::spawn(move || {
                let mut id = t;
                while !stop.load(Ordering::Relaxed) {
                    bus.event(&(id % ADDRESSES), |h| h.increment());
                    id = id.wrapping_add(1);
                }
            })
        })
        .collect();

    let mut retired = Vec::new();
    for _ in 0..50 {
        let recorder = Recorder::new("multi", &log);
        let multi = CounterMultiHandler::new(&bus, as_counter(&recorder));
        for id in 0..ADDRESSES {
            multi.bus_connect(id).unwrap();
        }
        thread::yield_now();
        multi.bus_disconnect();
        recorder.retire();
        retired.push(recorder);
    }

    thread::sleep(Duration::from_millis(10));
    stop.store(true, Ordering::Relaxed);
    for dispatcher in dispatchers {
        dispatcher.join().unwrap();
    }
    assert!(retired.iter().all(|recorder| recorder.late_calls() == 0));
}

#[test]
fn overlapping_multi_handlers_disconnect_concurrently_without_deadlock() {
    let bus = CounterBus::new();
    let log = new_log();
    let stop = Arc::new(AtomicBool::new(false));

    let dispatcher = {
        let (bus, stop) = (bus.clone(), Arc::clone(&stop));
        thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                bus.broadcast(|h| h.increment());
            }
        })
    };

    let workers: Vec<_> = (0..4u32)
        .map(|t| {
            let (bus, log) = (bus.clone(), Arc::clone(&log));
            thread::spawn(move || {
                for _ in 0..100 {
                    let recorder = Recorder::new("overlap", &log);
                    let multi = CounterMultiHandler::new(&bus, as_counter(&recorder));
                    // same addresses, different connection order per worker
                    for offset in 0..4 {
                        multi.bus_connect((t + offset) % 4).unwrap();
                    }
                    drop(multi);
                    recorder.retire();
                    assert_eq!(recorder.late_calls(), 0);
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    dispatcher.join().unwrap();
    assert_eq!(bus.address_count(), 0);
}
