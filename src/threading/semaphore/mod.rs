//! Counting semaphore
//!
//! The emulator only ever needs `post` and an unbounded `wait`, so that is the
//! whole backend contract. Each platform supplies the native semaphore it has;
//! callers see the same [`Semaphore`] everywhere.

mod condvar;

pub use condvar::CondvarSemaphore;

use std::fmt;

use super::Result;

/// Native counting semaphore contract
///
/// Waiters may be released in any order.
pub trait SemaphoreBackend: Send + Sync + Sized {
    /// Create a semaphore holding `initial` permits
    fn new(initial: u32) -> Result<Self>;

    /// Add one permit, releasing one blocked waiter if there is one
    fn post(&self);

    /// Block while no permit is available, then take one
    fn wait(&self);
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))] {
        mod posix;
        pub use posix::PosixSemaphore as PlatformSemaphore;
    } else if #[cfg(target_os = "macos")] {
        mod dispatch;
        pub use dispatch::DispatchSemaphore as PlatformSemaphore;
    } else if #[cfg(windows)] {
        mod win32;
        pub use win32::Win32Semaphore as PlatformSemaphore;
    } else {
        pub use condvar::CondvarSemaphore as PlatformSemaphore;
    }
}

/// A named counting semaphore
///
/// Dropping the semaphore releases the native object. Nothing may still be
/// waiting on it at that point.
pub struct Semaphore<B: SemaphoreBackend = PlatformSemaphore> {
    backend: B,
    name: Option<String>,
}

impl Semaphore {
    /// Create a semaphore on the platform backend
    ///
    /// # Arguments
    /// * `initial` - Initial permit count
    /// * `name` - Optional name for debugging
    ///
    /// # Errors
    /// Returns `ThreadError::SemaphoreInit` if the OS refuses the semaphore
    pub fn new(initial: u32, name: Option<&str>) -> Result<Self> {
        Self::with_backend(initial, name)
    }
}

impl<B: SemaphoreBackend> Semaphore<B> {
    /// Create a semaphore on an explicit backend
    pub fn with_backend(initial: u32, name: Option<&str>) -> Result<Self> {
        Ok(Self {
            backend: B::new(initial)?,
            name: name.map(String::from),
        })
    }

    /// Increment the count, releasing one waiter if any
    pub fn post(&self) {
        self.backend.post();
    }

    /// Block while the count is zero, then decrement it
    pub fn wait(&self) {
        self.backend.wait();
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl<B: SemaphoreBackend> fmt::Debug for Semaphore<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Semaphore").field("name", &self.name).finish()
    }
}
