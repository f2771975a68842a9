//! Fixed table of numbered workers.
//!
//! The emulator core owns one [`WorkerRegistry`] and hands it by reference to
//! whatever needs to start, join or wake a subsystem thread. Slots are indexed
//! by small integer ids and allocated once, up front.
//!
//! Each running slot carries its own [`WakeSignal`]. A worker parks on it with
//! [`WorkerContext::sleep_until_woken`]; anyone holding the registry can
//! release it with [`WorkerRegistry::wake`]. Wakes are lossy: one sent while
//! the worker is not asleep is simply dropped.

use std::cell::RefCell;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use parking_lot::Mutex;

use super::{Result, ThreadError, WakeSignal};
use crate::config::ThreadConfig;

/// Slot count used when no configuration says otherwise
pub const DEFAULT_WORKER_SLOTS: usize = 16;

thread_local! {
    static CURRENT_WORKER: RefCell<Option<(usize, Arc<WakeSignal>)>> = const { RefCell::new(None) };
}

/// What a worker's entry function gets to know about itself
pub struct WorkerContext {
    id: usize,
    name: String,
    wake: Arc<WakeSignal>,
}

impl WorkerContext {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Park this worker until [`WorkerRegistry::wake`] is called for it
    pub fn sleep_until_woken(&self) {
        self.wake.sleep();
    }
}

/// Id of the registry worker running on the calling thread, if any
pub fn current_worker_id() -> Option<usize> {
    CURRENT_WORKER.with(|current| current.borrow().as_ref().map(|(id, _)| *id))
}

/// Park the calling worker until it is woken
///
/// Returns at once when the calling thread was not started by a registry.
pub fn sleep_until_woken() {
    let wake = CURRENT_WORKER.with(|current| current.borrow().as_ref().map(|(_, w)| Arc::clone(w)));
    match wake {
        Some(wake) => wake.sleep(),
        None => debug!("sleep_until_woken called outside a worker thread"),
    }
}

#[derive(Default)]
struct WorkerSlot {
    handle: Option<JoinHandle<()>>,
    // Present from start until the join completes; doubles as the running flag.
    wake: Option<Arc<WakeSignal>>,
    name: Option<String>,
}

impl WorkerSlot {
    fn is_running(&self) -> bool {
        self.wake.is_some()
    }
}

pub struct WorkerRegistry {
    slots: Box<[Mutex<WorkerSlot>]>,
    stack_size: Option<usize>,
    name_prefix: String,
}

impl WorkerRegistry {
    /// Create a registry with `slots` worker ids (`0..slots`)
    pub fn new(slots: usize) -> Self {
        Self {
            slots: (0..slots).map(|_| Mutex::new(WorkerSlot::default())).collect(),
            stack_size: None,
            name_prefix: String::from("worker-"),
        }
    }

    pub fn from_config(config: &ThreadConfig) -> Self {
        let mut registry = Self::new(config.worker_slots);
        registry.stack_size = config.stack_size;
        registry.name_prefix = config.name_prefix.clone();
        registry
    }

    /// Number of worker ids this registry can hold
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, id: usize) -> Result<&Mutex<WorkerSlot>> {
        self.slots.get(id).ok_or(ThreadError::InvalidWorkerId {
            id,
            slots: self.slots.len(),
        })
    }

    /// Run `entry` on a new OS thread registered under `id`
    ///
    /// # Errors
    /// - `ThreadError::InvalidWorkerId` if `id` is out of range
    /// - `ThreadError::SlotBusy` if the previous occupant was never joined
    /// - `ThreadError::SpawnFailed` if the OS refuses the thread; the slot
    ///   stays free
    pub fn start<F>(&self, id: usize, entry: F) -> Result<()>
    where
        F: FnOnce(WorkerContext) + Send + 'static,
    {
        let mut slot = self.slot(id)?.lock();
        if slot.is_running() {
            return Err(ThreadError::SlotBusy { id });
        }

        let name = format!("{}{}", self.name_prefix, id);
        let wake = Arc::new(WakeSignal::new());
        let context = WorkerContext {
            id,
            name: name.clone(),
            wake: Arc::clone(&wake),
        };

        let mut builder = thread::Builder::new().name(name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder
            .spawn(move || {
                CURRENT_WORKER.with(|current| {
                    *current.borrow_mut() = Some((context.id, Arc::clone(&context.wake)));
                });
                entry(context);
            })
            .map_err(|source| {
                warn!("failed to start worker {}: {}", id, source);
                ThreadError::SpawnFailed { id, source }
            })?;

        debug!("worker {} started as {:?}", id, name);
        slot.handle = Some(handle);
        slot.wake = Some(wake);
        slot.name = Some(name);
        Ok(())
    }

    /// Block until worker `id` has returned, then free its slot
    ///
    /// Does nothing if the slot is not running. Only one caller may wait on a
    /// given id at a time. While the join is in progress the slot still counts
    /// as running.
    ///
    /// # Errors
    /// - `ThreadError::InvalidWorkerId` if `id` is out of range
    /// - `ThreadError::JoinFailed` if the worker panicked (the slot is freed)
    pub fn wait(&self, id: usize) -> Result<()> {
        let slot = self.slot(id)?;
        let Some(handle) = slot.lock().handle.take() else {
            return Ok(());
        };

        let joined = handle.join();
        {
            let mut slot = slot.lock();
            slot.wake = None;
            slot.name = None;
        }

        joined.map_err(|_| {
            warn!("worker {} panicked", id);
            ThreadError::JoinFailed { id }
        })?;
        debug!("worker {} joined", id);
        Ok(())
    }

    /// Wake worker `id` if it is asleep in `sleep_until_woken`
    ///
    /// Returns whether a sleeper was actually released. A wake sent while the
    /// worker is busy, or while the slot is not running, is lost.
    ///
    /// # Errors
    /// Returns `ThreadError::InvalidWorkerId` if `id` is out of range
    pub fn wake(&self, id: usize) -> Result<bool> {
        let wake = self.slot(id)?.lock().wake.clone();
        Ok(wake.is_some_and(|wake| wake.wake()))
    }

    pub fn is_running(&self, id: usize) -> bool {
        self.slots.get(id).is_some_and(|slot| slot.lock().is_running())
    }

    /// Whether worker `id` is parked waiting for a wake right now
    pub fn is_sleeping(&self, id: usize) -> bool {
        self.slots.get(id).is_some_and(|slot| {
            slot.lock()
                .wake
                .as_ref()
                .is_some_and(|wake| wake.sleepers() > 0)
        })
    }

    pub fn worker_name(&self, id: usize) -> Option<String> {
        self.slots.get(id).and_then(|slot| slot.lock().name.clone())
    }

    pub fn running_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.lock().is_running()).count()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_WORKER_SLOTS)
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("capacity", &self.capacity())
            .field("running", &self.running_count())
            .finish()
    }
}
