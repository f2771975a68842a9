//! Unnamed POSIX semaphore (`sem_t`).

use std::cell::UnsafeCell;
use std::io;

use log::warn;

use super::SemaphoreBackend;
use crate::threading::{Result, ThreadError};

pub struct PosixSemaphore {
    // Boxed so the sem_t never moves after sem_init.
    sem: Box<UnsafeCell<libc::sem_t>>,
}

// SAFETY: sem_t is designed for concurrent use through sem_post/sem_wait.
unsafe impl Send for PosixSemaphore {}
unsafe impl Sync for PosixSemaphore {}

impl SemaphoreBackend for PosixSemaphore {
    fn new(initial: u32) -> Result<Self> {
        // SAFETY: sem_init fully initializes the zeroed storage below.
        let sem = Box::new(UnsafeCell::new(unsafe { std::mem::zeroed::<libc::sem_t>() }));
        let rc = unsafe { libc::sem_init(sem.get(), 0, initial as libc::c_uint) };
        if rc != 0 {
            return Err(ThreadError::SemaphoreInit(io::Error::last_os_error()));
        }
        Ok(Self { sem })
    }

    fn post(&self) {
        if unsafe { libc::sem_post(self.sem.get()) } != 0 {
            warn!("sem_post failed: {}", io::Error::last_os_error());
        }
    }

    fn wait(&self) {
        loop {
            if unsafe { libc::sem_wait(self.sem.get()) } == 0 {
                return;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                warn!("sem_wait failed: {}", err);
                return;
            }
        }
    }
}

impl Drop for PosixSemaphore {
    fn drop(&mut self) {
        unsafe {
            libc::sem_destroy(self.sem.get());
        }
    }
}
