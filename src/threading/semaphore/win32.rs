//! Win32 semaphore object (`CreateSemaphoreW`).

use std::io;
use std::ptr;

use log::warn;
use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0};
use windows_sys::Win32::System::Threading::{
    CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject, INFINITE,
};

use super::SemaphoreBackend;
use crate::threading::{Result, ThreadError};

/// Highest count the kernel object may reach
const MAX_COUNT: i32 = i32::MAX;

pub struct Win32Semaphore {
    handle: HANDLE,
}

// SAFETY: semaphore handles may be used from any thread.
unsafe impl Send for Win32Semaphore {}
unsafe impl Sync for Win32Semaphore {}

impl SemaphoreBackend for Win32Semaphore {
    fn new(initial: u32) -> Result<Self> {
        let initial = i32::try_from(initial).map_err(|_| {
            ThreadError::SemaphoreInit(io::Error::new(
                io::ErrorKind::InvalidInput,
                "initial count exceeds the Win32 semaphore maximum",
            ))
        })?;
        let handle = unsafe { CreateSemaphoreW(ptr::null(), initial, MAX_COUNT, ptr::null()) };
        if handle == 0 {
            return Err(ThreadError::SemaphoreInit(io::Error::last_os_error()));
        }
        Ok(Self { handle })
    }

    fn post(&self) {
        if unsafe { ReleaseSemaphore(self.handle, 1, ptr::null_mut()) } == 0 {
            warn!("ReleaseSemaphore failed: {}", io::Error::last_os_error());
        }
    }

    fn wait(&self) {
        if unsafe { WaitForSingleObject(self.handle, INFINITE) } != WAIT_OBJECT_0 {
            warn!("WaitForSingleObject failed: {}", io::Error::last_os_error());
        }
    }
}

impl Drop for Win32Semaphore {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
