//! libdispatch semaphore (`dispatch_semaphore_t`), used on macOS where unnamed
//! POSIX semaphores are not implemented.

use std::ffi::{c_long, c_void};
use std::io;

use super::SemaphoreBackend;
use crate::threading::{Result, ThreadError};

#[allow(non_camel_case_types)]
type dispatch_semaphore_t = *mut c_void;
#[allow(non_camel_case_types)]
type dispatch_time_t = u64;

const DISPATCH_TIME_FOREVER: dispatch_time_t = !0;

// libdispatch ships in libSystem, which every macOS binary links.
extern "C" {
    fn dispatch_semaphore_create(value: c_long) -> dispatch_semaphore_t;
    fn dispatch_semaphore_signal(dsema: dispatch_semaphore_t) -> c_long;
    fn dispatch_semaphore_wait(dsema: dispatch_semaphore_t, timeout: dispatch_time_t) -> c_long;
    fn dispatch_release(object: *mut c_void);
}

pub struct DispatchSemaphore {
    sem: dispatch_semaphore_t,
}

// SAFETY: dispatch semaphores are thread-safe reference-counted objects.
unsafe impl Send for DispatchSemaphore {}
unsafe impl Sync for DispatchSemaphore {}

impl SemaphoreBackend for DispatchSemaphore {
    fn new(initial: u32) -> Result<Self> {
        // libdispatch aborts when a semaphore is released below the value it
        // was created with, so start at zero and post the initial permits.
        let sem = unsafe { dispatch_semaphore_create(0) };
        if sem.is_null() {
            return Err(ThreadError::SemaphoreInit(io::Error::new(
                io::ErrorKind::Other,
                "dispatch_semaphore_create returned NULL",
            )));
        }
        let sem = Self { sem };
        for _ in 0..initial {
            sem.post();
        }
        Ok(sem)
    }

    fn post(&self) {
        unsafe {
            dispatch_semaphore_signal(self.sem);
        }
    }

    fn wait(&self) {
        unsafe {
            dispatch_semaphore_wait(self.sem, DISPATCH_TIME_FOREVER);
        }
    }
}

impl Drop for DispatchSemaphore {
    fn drop(&mut self) {
        unsafe {
            dispatch_release(self.sem);
        }
    }
}
