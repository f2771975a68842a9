//! Threading primitives for the emulator core
//!
//! This module provides the small set of primitives that independently scheduled
//! emulation subsystems (CPU interpreter, video, audio, peripheral polling) use to
//! talk to each other without touching the host threading API directly.
//!
//! # Components
//!
//! - [`EmuMutex`]: a bare lock with explicit `lock`/`unlock`
//! - [`Semaphore`]: counting semaphore over a per-platform backend
//! - [`EventQueue`]: bounded blocking FIFO shared by producers and consumers
//! - [`WorkerRegistry`]: fixed table of numbered workers with start/wait/wake
//!
//! Everything here blocks. There are no timeouts and no cancellation: a blocked
//! thread is released only by another thread doing the complementary operation.

#[cfg(test)]
mod tests;

mod mutex;
mod queue;
mod registry;
mod semaphore;
mod wake;

pub use mutex::{EmuMutex, EmuMutexGuard};
pub use queue::{EventQueue, QueueState};
pub use registry::{
    current_worker_id, sleep_until_woken, WorkerContext, WorkerRegistry, DEFAULT_WORKER_SLOTS,
};
pub use semaphore::{CondvarSemaphore, PlatformSemaphore, Semaphore, SemaphoreBackend};
pub use wake::WakeSignal;

use std::thread;
use std::time::Duration;

use log::debug;

/// Error type for threading operations
#[derive(Debug, thiserror::Error)]
pub enum ThreadError {
    /// The OS refused to create the worker thread
    #[error("Failed to spawn worker {id}: {source}")]
    SpawnFailed {
        id: usize,
        #[source]
        source: std::io::Error,
    },

    /// The worker panicked; the slot has been reaped anyway
    #[error("Worker {id} panicked before it was joined")]
    JoinFailed { id: usize },

    #[error("Worker id {id} out of range (registry has {slots} slots)")]
    InvalidWorkerId { id: usize, slots: usize },

    #[error("Worker slot {id} is still running")]
    SlotBusy { id: usize },

    /// The native semaphore could not be initialized
    #[error("Semaphore init failed: {0}")]
    SemaphoreInit(#[source] std::io::Error),

    #[error("Queue capacity must be greater than zero")]
    InvalidCapacity,
}

pub type Result<T> = std::result::Result<T, ThreadError>;

// ============================================================================
// Scheduling helpers
// ============================================================================

/// Give up the rest of the current time slice
pub fn yield_now() {
    thread::yield_now();
}

/// Sleep the calling thread for `usec` microseconds
///
/// Platforms whose sleep only has millisecond granularity sleep for
/// `usec / 1000` milliseconds and hand back the `usec % 1000` they could not
/// honor, so frame pacing code can carry the remainder into the next frame.
/// Everywhere else the full duration is slept and the return value is 0.
pub fn sleep_us(usec: u32) -> u32 {
    if cfg!(windows) {
        thread::sleep(Duration::from_millis(u64::from(usec / 1000)));
        usec % 1000
    } else {
        thread::sleep(Duration::from_micros(u64::from(usec)));
        0
    }
}

/// Hint that the calling thread should run on the CPUs set in `mask`
///
/// Best effort only. Bit `n` selects CPU `n`. A zero mask, an unsupported
/// platform or a refused request leaves the thread where it was.
pub fn set_affinity(mask: u64) {
    if mask == 0 {
        debug!("set_affinity: empty mask ignored");
        return;
    }
    if let Err(e) = apply_affinity(mask) {
        debug!("set_affinity: mask {:#x} not applied: {}", mask, e);
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn apply_affinity(mask: u64) -> std::io::Result<()> {
            // SAFETY: cpu_set_t is plain data and all-zero is the empty set.
            let mut set: libc::cpu_set_t = unsafe { std::mem::zeroed() };
            for cpu in 0..u64::BITS as usize {
                if mask & (1u64 << cpu) != 0 {
                    unsafe { libc::CPU_SET(cpu, &mut set) };
                }
            }
            // pid 0 targets the calling thread.
            let rc = unsafe {
                libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
            };
            if rc == 0 {
                Ok(())
            } else {
                Err(std::io::Error::last_os_error())
            }
        }
    } else {
        fn apply_affinity(_mask: u64) -> std::io::Result<()> {
            Ok(())
        }
    }
}
