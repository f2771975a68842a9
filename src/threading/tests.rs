//! Unit tests for the threading module
//!
//! # Test Categories
//! 1. Worker registry tests - start, wait, wake, slot reuse, errors
//! 2. Mutex tests - mutual exclusion under contention
//! 3. Semaphore tests - handshakes between workers
//! 4. Event queue tests - rendezvous, backpressure, many producers/consumers
//! 5. Scheduling helper tests - yield, sleep, affinity

use super::*;
use crossbeam::channel;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Poll `cond` until it holds, failing the test after a generous deadline
fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

// ============================================================================
// Worker Registry Tests
// ============================================================================

/// Join returns only after the entry function finished, and its writes are
/// visible to the joiner.
#[test]
fn test_wait_sees_worker_writes() {
    let registry = WorkerRegistry::new(4);
    let counter = Arc::new(AtomicUsize::new(0));
    let counter_clone = Arc::clone(&counter);

    registry
        .start(0, move |_| {
            for _ in 0..1000 {
                counter_clone.fetch_add(1, Ordering::Relaxed);
            }
        })
        .expect("start should succeed");
    registry.wait(0).expect("wait should succeed");

    assert_eq!(counter.load(Ordering::Relaxed), 1000);
    assert!(!registry.is_running(0));
}

#[test]
fn test_worker_context_identity() {
    let registry = WorkerRegistry::new(4);
    let (tx, rx) = channel::bounded(1);

    registry
        .start(3, move |ctx| {
            let _ = tx.send((ctx.id(), ctx.name().to_string(), current_worker_id()));
        })
        .unwrap();
    let (id, name, current) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    registry.wait(3).unwrap();

    assert_eq!(id, 3);
    assert_eq!(name, "worker-3");
    assert_eq!(current, Some(3));
    assert_eq!(current_worker_id(), None);
}

#[test]
fn test_wait_on_idle_slot_is_noop() {
    let registry = WorkerRegistry::new(2);
    registry.wait(1).expect("idle wait should succeed");
    assert!(!registry.is_running(1));
}

#[test]
fn test_out_of_range_id_rejected() {
    let registry = WorkerRegistry::new(2);
    assert!(matches!(
        registry.start(2, |_| {}),
        Err(ThreadError::InvalidWorkerId { id: 2, slots: 2 })
    ));
    assert!(matches!(
        registry.wait(5),
        Err(ThreadError::InvalidWorkerId { .. })
    ));
    assert!(matches!(
        registry.wake(9),
        Err(ThreadError::InvalidWorkerId { .. })
    ));
    assert!(!registry.is_running(9));
}

#[test]
fn test_start_on_running_slot_is_busy() {
    let registry = WorkerRegistry::new(2);
    let gate = Arc::new(Semaphore::new(0, Some("gate")).unwrap());
    let worker_gate = Arc::clone(&gate);

    registry.start(0, move |_| worker_gate.wait()).unwrap();
    assert!(matches!(
        registry.start(0, |_| {}),
        Err(ThreadError::SlotBusy { id: 0 })
    ));

    gate.post();
    registry.wait(0).unwrap();
}

/// A slot becomes available again once its previous occupant was joined.
#[test]
fn test_slot_reuse_after_wait() {
    let registry = WorkerRegistry::new(1);
    let runs = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let runs_clone = Arc::clone(&runs);
        registry
            .start(0, move |_| {
                runs_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        registry.wait(0).unwrap();
    }

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(registry.running_count(), 0);
}

#[test]
fn test_panicking_worker_is_reaped() {
    let registry = WorkerRegistry::new(1);
    registry.start(0, |_| panic!("worker blew up")).unwrap();

    assert!(matches!(
        registry.wait(0),
        Err(ThreadError::JoinFailed { id: 0 })
    ));
    assert!(!registry.is_running(0));
    registry.start(0, |_| {}).unwrap();
    registry.wait(0).unwrap();
}

#[test]
fn test_wake_on_idle_slot_is_noop() {
    let registry = WorkerRegistry::new(1);
    assert!(!registry.wake(0).unwrap());
}

/// Wake race: a wake sent before the worker sleeps is lost; one sent while it
/// is confirmed asleep releases it.
#[test]
fn test_wake_race_loses_early_wake() {
    let registry = WorkerRegistry::new(2);
    let gate = Arc::new(Semaphore::new(0, Some("sleep_gate")).unwrap());
    let resumed = Arc::new(AtomicBool::new(false));

    let worker_gate = Arc::clone(&gate);
    let worker_resumed = Arc::clone(&resumed);
    registry
        .start(1, move |ctx| {
            worker_gate.wait();
            ctx.sleep_until_woken();
            worker_resumed.store(true, Ordering::SeqCst);
        })
        .unwrap();

    // worker is held at the gate, not sleeping: this wake goes nowhere
    assert!(!registry.wake(1).unwrap());

    gate.post();
    wait_until("worker to fall asleep", || registry.is_sleeping(1));
    thread::sleep(Duration::from_millis(50));
    assert!(!resumed.load(Ordering::SeqCst), "lost wake must not be replayed");

    assert!(registry.wake(1).unwrap());
    wait_until("worker to resume", || resumed.load(Ordering::SeqCst));
    registry.wait(1).unwrap();
}

#[test]
fn test_free_sleep_uses_current_worker() {
    let registry = WorkerRegistry::new(1);
    let (tx, rx) = channel::bounded(1);
    registry
        .start(0, move |_| {
            sleep_until_woken();
            let _ = tx.send(());
        })
        .unwrap();

    wait_until("worker to fall asleep", || registry.is_sleeping(0));
    registry.wake(0).unwrap();
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    registry.wait(0).unwrap();
}

#[test]
fn test_free_sleep_outside_worker_returns() {
    sleep_until_woken();
}

#[test]
fn test_registry_from_config() {
    let config = crate::config::ThreadConfig {
        worker_slots: 3,
        name_prefix: String::from("vdp-"),
        stack_size: Some(256 * 1024),
        ..Default::default()
    };
    let registry = WorkerRegistry::from_config(&config);
    assert_eq!(registry.capacity(), 3);

    let gate = Arc::new(Semaphore::new(0, None).unwrap());
    let worker_gate = Arc::clone(&gate);
    registry.start(2, move |_| worker_gate.wait()).unwrap();
    assert_eq!(registry.worker_name(2).as_deref(), Some("vdp-2"));
    gate.post();
    registry.wait(2).unwrap();
    assert_eq!(registry.worker_name(2), None);
}

// ============================================================================
// Mutex Tests
// ============================================================================

/// Two workers increment a plain counter N times each, only under the lock.
/// The lock is the only thing making that safe, so 2N proves exclusion.
#[test]
fn test_mutex_excludes_two_workers() {
    struct Shared {
        lock: EmuMutex,
        inside: AtomicBool,
        counter: std::cell::UnsafeCell<u64>,
    }
    // SAFETY: counter is only touched while `lock` is held.
    unsafe impl Sync for Shared {}

    const N: u64 = 10_000;
    let shared = Arc::new(Shared {
        lock: EmuMutex::new(Some("counter")),
        inside: AtomicBool::new(false),
        counter: std::cell::UnsafeCell::new(0),
    });

    let registry = WorkerRegistry::new(2);
    for id in 0..2 {
        let shared = Arc::clone(&shared);
        registry
            .start(id, move |_| {
                for _ in 0..N {
                    shared.lock.lock();
                    assert!(!shared.inside.swap(true, Ordering::SeqCst));
                    unsafe { *shared.counter.get() += 1 };
                    shared.inside.store(false, Ordering::SeqCst);
                    unsafe { shared.lock.unlock() };
                }
            })
            .unwrap();
    }
    registry.wait(0).unwrap();
    registry.wait(1).unwrap();

    let _guard = shared.lock.lock_guard();
    assert_eq!(unsafe { *shared.counter.get() }, 2 * N);
}

// ============================================================================
// Semaphore Tests
// ============================================================================

/// Ping-pong between two workers using a pair of semaphores
#[test]
fn test_semaphore_handshake() {
    let ping = Arc::new(Semaphore::new(0, Some("ping")).unwrap());
    let pong = Arc::new(Semaphore::new(0, Some("pong")).unwrap());
    let rounds = Arc::new(AtomicUsize::new(0));

    let registry = WorkerRegistry::new(1);
    {
        let ping = Arc::clone(&ping);
        let pong = Arc::clone(&pong);
        let rounds = Arc::clone(&rounds);
        registry
            .start(0, move |_| {
                for _ in 0..100 {
                    ping.wait();
                    rounds.fetch_add(1, Ordering::SeqCst);
                    pong.post();
                }
            })
            .unwrap();
    }

    for i in 0..100 {
        ping.post();
        pong.wait();
        assert_eq!(rounds.load(Ordering::SeqCst), i + 1);
    }
    registry.wait(0).unwrap();
}

// ============================================================================
// Event Queue Tests
// ============================================================================

/// Capacity-1 queue as a rendezvous: the second push blocks until the first
/// item is popped.
#[test]
fn test_capacity_one_rendezvous() {
    let queue = EventQueue::with_capacity(1).unwrap();
    queue.push("A");

    let producer = queue.clone();
    let (tx, rx) = channel::bounded(1);
    let handle = thread::spawn(move || {
        producer.push("B");
        let _ = tx.send(());
    });

    assert!(
        rx.recv_timeout(Duration::from_millis(50)).is_err(),
        "push into a full queue must block"
    );
    assert_eq!(queue.pop(), "A");
    assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    assert_eq!(queue.pop(), "B");
    handle.join().unwrap();
}

/// Items pass between registry workers; every one arrives exactly once and
/// size never exceeds capacity.
#[test]
fn test_queue_many_producers_many_consumers() {
    const PRODUCERS: usize = 3;
    const CONSUMERS: usize = 3;
    const PER_PRODUCER: usize = 2_000;

    let queue: EventQueue<Option<usize>> = EventQueue::with_capacity(8).unwrap();
    let results: EventQueue<Vec<usize>> = EventQueue::with_capacity(CONSUMERS).unwrap();
    let registry = WorkerRegistry::new(PRODUCERS + CONSUMERS);

    for p in 0..PRODUCERS {
        let queue = queue.clone();
        registry
            .start(p, move |_| {
                for i in 0..PER_PRODUCER {
                    queue.push(Some(p * PER_PRODUCER + i));
                    assert!(queue.len() <= queue.capacity());
                }
            })
            .unwrap();
    }
    for c in 0..CONSUMERS {
        let queue = queue.clone();
        let results = results.clone();
        registry
            .start(PRODUCERS + c, move |_| {
                let mut seen = Vec::new();
                while let Some(item) = queue.pop() {
                    seen.push(item);
                }
                results.push(seen);
            })
            .unwrap();
    }

    for p in 0..PRODUCERS {
        registry.wait(p).unwrap();
    }
    // one stop marker per consumer
    for _ in 0..CONSUMERS {
        queue.push(None);
    }
    for c in 0..CONSUMERS {
        registry.wait(PRODUCERS + c).unwrap();
    }

    let mut all: Vec<usize> = (0..CONSUMERS).flat_map(|_| results.pop()).collect();
    assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len(), "no item may be duplicated");
    all.sort_unstable();
    assert_eq!(all, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
}

/// A single producer and consumer keep per-producer order.
#[test]
fn test_queue_fifo_across_threads() {
    let queue = EventQueue::with_capacity(4).unwrap();
    let producer = queue.clone();
    let handle = thread::spawn(move || {
        for i in 0..500u32 {
            producer.push(i);
        }
    });

    for expected in 0..500u32 {
        assert_eq!(queue.pop(), expected);
    }
    handle.join().unwrap();
}

// ============================================================================
// Scheduling Helper Tests
// ============================================================================

#[test]
fn test_yield_now_returns() {
    yield_now();
}

#[test]
fn test_sleep_us_honors_duration() {
    let start = Instant::now();
    let remainder = sleep_us(20_500);
    let elapsed = start.elapsed();

    if cfg!(windows) {
        assert_eq!(remainder, 500);
        assert!(elapsed >= Duration::from_millis(20));
    } else {
        assert_eq!(remainder, 0);
        assert!(elapsed >= Duration::from_micros(20_500));
    }
}

#[test]
fn test_sleep_us_zero() {
    assert_eq!(sleep_us(0), 0);
}

#[test]
fn test_set_affinity_is_best_effort() {
    // none of these may panic or error, supported or not
    set_affinity(0);
    set_affinity(1);
    set_affinity(u64::MAX);
}
