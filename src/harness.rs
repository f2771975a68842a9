//! Producer/consumer stress run over the threading primitives.
//!
//! Producers and consumers are registry workers. They are held at a semaphore
//! gate until all of them exist, then pass numbered items through one bounded
//! event queue. Consumers stop on a sentinel, report what they saw through a
//! second queue, and take an [`EmuMutex`] around a shared critical section so
//! any overlap would show up in the report.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::config::ThreadConfig;
use crate::threading::{self, EmuMutex, EventQueue, Semaphore, WorkerRegistry};

/// Largest item count a single run will tally
pub const MAX_ITEMS: usize = 1 << 28;

/// Shape of one stress run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StressPlan {
    pub producers: usize,
    pub consumers: usize,
    pub items: u64,
}

impl Default for StressPlan {
    fn default() -> Self {
        Self {
            producers: 2,
            consumers: 2,
            items: 10_000,
        }
    }
}

/// What a stress run observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressReport {
    pub sent: u64,
    pub received: u64,
    pub missing: u64,
    pub duplicated: u64,
    /// Times a consumer found another one inside the mutex-guarded section
    pub overlaps: u64,
    pub elapsed: Duration,
}

impl StressReport {
    /// Every item arrived exactly once and the mutex never leaked
    pub fn is_clean(&self) -> bool {
        self.missing == 0 && self.duplicated == 0 && self.overlaps == 0
    }
}

enum Message {
    Item(u64),
    Stop,
}

struct CriticalSection {
    lock: EmuMutex,
    inside: AtomicBool,
    overlaps: AtomicU64,
}

impl CriticalSection {
    fn enter(&self) {
        let _guard = self.lock.lock_guard();
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        threading::yield_now();
        self.inside.store(false, Ordering::SeqCst);
    }
}

/// Run `plan` with workers from a registry built from `config`
pub fn run_stress(config: &ThreadConfig, plan: &StressPlan) -> Result<StressReport> {
    run_stress_on(&WorkerRegistry::from_config(config), config, plan)
}

/// Run `plan` on worker slots `0..producers + consumers` of `registry`
///
/// If a worker fails to start, the ones already started are released and
/// joined before the error is returned.
pub fn run_stress_on(
    registry: &WorkerRegistry,
    config: &ThreadConfig,
    plan: &StressPlan,
) -> Result<StressReport> {
    if plan.producers == 0 || plan.consumers == 0 {
        anyhow::bail!("need at least one producer and one consumer");
    }
    // one tally slot per item, so the item count must fit in memory
    let tally_len = usize::try_from(plan.items)
        .ok()
        .filter(|&n| n <= MAX_ITEMS)
        .with_context(|| format!("{} items exceeds the limit of {}", plan.items, MAX_ITEMS))?;
    let workers = plan.producers + plan.consumers;
    if workers > registry.capacity() {
        anyhow::bail!(
            "{} workers requested but only {} worker slots configured",
            workers,
            registry.capacity()
        );
    }

    let queue: EventQueue<Message> = EventQueue::with_capacity(config.queue_capacity)?;
    let results: EventQueue<Vec<u64>> = EventQueue::with_capacity(plan.consumers)?;
    let gate = Arc::new(Semaphore::new(0, Some("stress_gate"))?);
    let cancelled = Arc::new(AtomicBool::new(false));
    let section = Arc::new(CriticalSection {
        lock: EmuMutex::new(Some("stress_section")),
        inside: AtomicBool::new(false),
        overlaps: AtomicU64::new(0),
    });

    // Started workers are parked on the gate; open it with the cancel flag set
    // so they return at once, then reap them.
    let abandon = |running: usize| {
        cancelled.store(true, Ordering::SeqCst);
        for _ in 0..running {
            gate.post();
        }
        for id in 0..running {
            if let Err(e) = registry.wait(id) {
                warn!("reaping worker {} after failed start: {}", id, e);
            }
        }
    };

    for p in 0..plan.producers {
        let queue = queue.clone();
        let gate = Arc::clone(&gate);
        let cancelled = Arc::clone(&cancelled);
        let stride = plan.producers as u64;
        let items = plan.items;
        let spawned = registry.start(p, move |ctx| {
            gate.wait();
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            let mut sent = 0u64;
            let mut item = p as u64;
            while item < items {
                queue.push(Message::Item(item));
                item += stride;
                sent += 1;
            }
            debug!("{} produced {} items", ctx.name(), sent);
        });
        if let Err(e) = spawned {
            abandon(p);
            return Err(anyhow::Error::new(e).context(format!("starting producer {}", p)));
        }
    }

    for c in 0..plan.consumers {
        let id = plan.producers + c;
        let queue = queue.clone();
        let results = results.clone();
        let gate = Arc::clone(&gate);
        let cancelled = Arc::clone(&cancelled);
        let section = Arc::clone(&section);
        let spawned = registry.start(id, move |ctx| {
            gate.wait();
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            let mut seen = Vec::new();
            while let Message::Item(item) = queue.pop() {
                section.enter();
                seen.push(item);
            }
            debug!("{} consumed {} items", ctx.name(), seen.len());
            results.push(seen);
        });
        if let Err(e) = spawned {
            abandon(id);
            return Err(anyhow::Error::new(e).context(format!("starting consumer {}", c)));
        }
    }

    let started = Instant::now();
    for _ in 0..workers {
        gate.post();
    }

    for p in 0..plan.producers {
        registry.wait(p)?;
    }
    for _ in 0..plan.consumers {
        queue.push(Message::Stop);
    }
    for c in 0..plan.consumers {
        registry.wait(plan.producers + c)?;
    }
    let elapsed = started.elapsed();

    let mut counts = vec![0u32; tally_len];
    let mut received = 0u64;
    let mut stray = 0u64;
    for _ in 0..plan.consumers {
        for item in results.pop() {
            received += 1;
            match counts.get_mut(item as usize) {
                Some(count) => *count += 1,
                None => stray += 1,
            }
        }
    }
    queue.destroy();
    results.destroy();

    let missing = counts.iter().filter(|&&n| n == 0).count() as u64;
    let duplicated = counts.iter().map(|&n| u64::from(n.saturating_sub(1))).sum::<u64>() + stray;
    let report = StressReport {
        sent: plan.items,
        received,
        missing,
        duplicated,
        overlaps: section.overlaps.load(Ordering::SeqCst),
        elapsed,
    };
    info!("stress run finished: {:?}", report);
    Ok(report)
}
