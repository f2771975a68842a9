//! Bare mutual-exclusion lock.
//!
//! Unlike `std::sync::Mutex`, [`EmuMutex`] protects no data of its own. It gates
//! state defined by the caller (shared emulated memory, device registers) and
//! exposes split `lock`/`unlock` calls so it can cross the C boundary. Rust
//! callers should prefer [`EmuMutex::lock_guard`].

use std::fmt;

use parking_lot::lock_api::RawMutex as _;
use parking_lot::RawMutex;

/// A named, non-reentrant lock
pub struct EmuMutex {
    raw: RawMutex,
    name: Option<String>,
}

impl EmuMutex {
    /// Create an unlocked mutex
    ///
    /// # Arguments
    /// * `name` - Optional name for debugging
    pub fn new(name: Option<&str>) -> Self {
        Self {
            raw: RawMutex::INIT,
            name: name.map(String::from),
        }
    }

    /// Block until the lock is acquired
    ///
    /// Locking twice from the same owner without unlocking deadlocks.
    pub fn lock(&self) {
        self.raw.lock();
    }

    /// Acquire the lock if it is free, without blocking
    pub fn try_lock(&self) -> bool {
        self.raw.try_lock()
    }

    /// Release the lock
    ///
    /// # Safety
    /// The lock must be held, and the caller must be the logical owner that
    /// acquired it through [`EmuMutex::lock`] or [`EmuMutex::try_lock`].
    pub unsafe fn unlock(&self) {
        self.raw.unlock();
    }

    /// Lock and return a guard that unlocks on drop
    pub fn lock_guard(&self) -> EmuMutexGuard<'_> {
        self.lock();
        EmuMutexGuard { mutex: self }
    }

    /// Whether some owner currently holds the lock (a hint, may be stale)
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl Default for EmuMutex {
    fn default() -> Self {
        Self::new(None)
    }
}

impl fmt::Debug for EmuMutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmuMutex")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// RAII guard returned by [`EmuMutex::lock_guard`]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct EmuMutexGuard<'a> {
    mutex: &'a EmuMutex,
}

impl Drop for EmuMutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard only exists while this owner holds the lock.
        unsafe { self.mutex.unlock() };
    }
}
