//! Portable semaphore built from a mutex-guarded count and a condition variable.

use parking_lot::{Condvar, Mutex};

use super::SemaphoreBackend;
use crate::threading::Result;

#[derive(Debug)]
pub struct CondvarSemaphore {
    count: Mutex<u32>,
    available: Condvar,
}

impl SemaphoreBackend for CondvarSemaphore {
    fn new(initial: u32) -> Result<Self> {
        Ok(Self {
            count: Mutex::new(initial),
            available: Condvar::new(),
        })
    }

    fn post(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_add(1);
        self.available.notify_one();
    }

    fn wait(&self) {
        let mut count = self.count.lock();
        while *count == 0 {
            self.available.wait(&mut count);
        }
        *count -= 1;
    }
}
