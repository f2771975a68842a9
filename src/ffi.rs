//! C ABI for the threading layer
//!
//! Handles are opaque pointers to boxed Rust objects. Workers started through
//! this surface live in one process-wide [`WorkerRegistry`] with
//! [`DEFAULT_WORKER_SLOTS`] slots. Queue payloads are pointer-sized tokens
//! that this layer never dereferences or frees.
//!
//! Null handles are ignored by every call that takes one.

use std::ffi::{c_int, c_uint, c_void};
use std::ptr;
use std::sync::OnceLock;

use log::warn;

use crate::threading::{
    self, EmuMutex, EventQueue, Semaphore, WorkerRegistry, DEFAULT_WORKER_SLOTS,
};

/// Worker entry point as seen from C
pub type ThreadEntry = unsafe extern "C" fn(*mut c_void) -> *mut c_void;

/// Opaque handle to a mutex
#[repr(C)]
pub struct RustMutex {
    _private: [u8; 0],
}

/// Opaque handle to a semaphore
#[repr(C)]
pub struct RustSemaphore {
    _private: [u8; 0],
}

/// Opaque handle to an event queue
#[repr(C)]
pub struct RustEventQueue {
    _private: [u8; 0],
}

static REGISTRY: OnceLock<WorkerRegistry> = OnceLock::new();

fn registry() -> &'static WorkerRegistry {
    REGISTRY.get_or_init(|| WorkerRegistry::new(DEFAULT_WORKER_SLOTS))
}

// --- Thread Operations ---

/// Start worker `id` running `func(arg)`
///
/// # Returns
/// 0 on success, -1 if the id is invalid or busy or the thread could not be
/// created
///
/// # Safety
/// * `func` must be safe to call on another thread with `arg`
/// * `arg` must stay valid for as long as the worker uses it
#[no_mangle]
pub unsafe extern "C" fn rust_thread_start(
    id: c_uint,
    func: Option<ThreadEntry>,
    arg: *mut c_void,
) -> c_int {
    let Some(func) = func else {
        return -1;
    };
    // Raw pointers are not Send; carry the address instead.
    let arg_addr = arg as usize;

    match registry().start(id as usize, move |_| {
        // SAFETY: the caller vouched for func and arg.
        unsafe {
            func(arg_addr as *mut c_void);
        }
    }) {
        Ok(()) => 0,
        Err(e) => {
            warn!("rust_thread_start: {}", e);
            -1
        }
    }
}

/// Block until worker `id` has finished
#[no_mangle]
pub extern "C" fn rust_thread_wait(id: c_uint) {
    if let Err(e) = registry().wait(id as usize) {
        warn!("rust_thread_wait: {}", e);
    }
}

/// Wake worker `id` if it is sleeping; lost otherwise
#[no_mangle]
pub extern "C" fn rust_thread_wake(id: c_uint) {
    if let Err(e) = registry().wake(id as usize) {
        warn!("rust_thread_wake: {}", e);
    }
}

#[no_mangle]
pub extern "C" fn rust_thread_yield() {
    threading::yield_now();
}

/// Put the calling worker to sleep until someone wakes it
#[no_mangle]
pub extern "C" fn rust_thread_sleep() {
    threading::sleep_until_woken();
}

/// Sleep `usec` microseconds and return the part that was not honored
#[no_mangle]
pub extern "C" fn rust_thread_usleep(usec: c_uint) -> c_uint {
    threading::sleep_us(usec)
}

#[no_mangle]
pub extern "C" fn rust_thread_set_affinity(mask: c_int) {
    threading::set_affinity(u64::from(mask as c_uint));
}

// --- Mutex Operations ---

#[no_mangle]
pub extern "C" fn rust_mutex_create() -> *mut RustMutex {
    Box::into_raw(Box::new(EmuMutex::new(None))) as *mut RustMutex
}

/// # Safety
/// * `mutex` must be a valid handle from rust_mutex_create or NULL
#[no_mangle]
pub unsafe extern "C" fn rust_mutex_lock(mutex: *mut RustMutex) {
    if !mutex.is_null() {
        let mutex = &*(mutex as *mut EmuMutex);
        mutex.lock();
    }
}

/// # Safety
/// * `mutex` must be a valid handle or NULL
/// * The caller must hold the lock
#[no_mangle]
pub unsafe extern "C" fn rust_mutex_unlock(mutex: *mut RustMutex) {
    if !mutex.is_null() {
        let mutex = &*(mutex as *mut EmuMutex);
        mutex.unlock();
    }
}

/// # Safety
/// * `mutex` must be a valid handle or NULL; it is invalid afterwards
/// * Nobody may hold or wait on the lock
#[no_mangle]
pub unsafe extern "C" fn rust_mutex_free(mutex: *mut RustMutex) {
    if !mutex.is_null() {
        drop(Box::from_raw(mutex as *mut EmuMutex));
    }
}

// --- Semaphore Operations ---

/// Create a semaphore holding `initial` permits
///
/// # Returns
/// NULL if `initial` is negative or the native semaphore could not be created
#[no_mangle]
pub extern "C" fn rust_semaphore_create(initial: c_int) -> *mut RustSemaphore {
    let Ok(initial) = u32::try_from(initial) else {
        return ptr::null_mut();
    };
    match Semaphore::new(initial, None) {
        Ok(sem) => Box::into_raw(Box::new(sem)) as *mut RustSemaphore,
        Err(e) => {
            warn!("rust_semaphore_create: {}", e);
            ptr::null_mut()
        }
    }
}

/// # Safety
/// * `sem` must be a valid handle or NULL
#[no_mangle]
pub unsafe extern "C" fn rust_semaphore_post(sem: *mut RustSemaphore) {
    if !sem.is_null() {
        let sem = &*(sem as *mut Semaphore);
        sem.post();
    }
}

/// # Safety
/// * `sem` must be a valid handle or NULL
#[no_mangle]
pub unsafe extern "C" fn rust_semaphore_wait(sem: *mut RustSemaphore) {
    if !sem.is_null() {
        let sem = &*(sem as *mut Semaphore);
        sem.wait();
    }
}

/// # Safety
/// * `sem` must be a valid handle or NULL; it is invalid afterwards
/// * No thread may still be waiting on it
#[no_mangle]
pub unsafe extern "C" fn rust_semaphore_free(sem: *mut RustSemaphore) {
    if !sem.is_null() {
        drop(Box::from_raw(sem as *mut Semaphore));
    }
}

// --- Event Queue Operations ---

type TokenQueue = EventQueue<usize>;

/// Create a queue with room for `capacity` tokens
///
/// # Returns
/// NULL if `capacity` is not positive
#[no_mangle]
pub extern "C" fn rust_event_queue_create(capacity: c_int) -> *mut RustEventQueue {
    let Ok(capacity) = usize::try_from(capacity) else {
        return ptr::null_mut();
    };
    match TokenQueue::with_capacity(capacity) {
        Ok(queue) => Box::into_raw(Box::new(queue)) as *mut RustEventQueue,
        Err(e) => {
            warn!("rust_event_queue_create: {}", e);
            ptr::null_mut()
        }
    }
}

/// Append `payload`, blocking while the queue is full
///
/// # Safety
/// * `queue` must be a valid handle or NULL
#[no_mangle]
pub unsafe extern "C" fn rust_event_queue_push(queue: *mut RustEventQueue, payload: *mut c_void) {
    if !queue.is_null() {
        let queue = &*(queue as *mut TokenQueue);
        queue.push(payload as usize);
    }
}

/// Remove the oldest payload, blocking while the queue is empty
///
/// # Safety
/// * `queue` must be a valid handle or NULL (which returns NULL)
#[no_mangle]
pub unsafe extern "C" fn rust_event_queue_pop(queue: *mut RustEventQueue) -> *mut c_void {
    if queue.is_null() {
        return ptr::null_mut();
    }
    let queue = &*(queue as *mut TokenQueue);
    queue.pop() as *mut c_void
}

/// # Safety
/// * `queue` must be a valid handle or NULL (which returns 0)
#[no_mangle]
pub unsafe extern "C" fn rust_event_queue_size(queue: *mut RustEventQueue) -> c_int {
    if queue.is_null() {
        return 0;
    }
    let queue = &*(queue as *mut TokenQueue);
    c_int::try_from(queue.len()).unwrap_or(c_int::MAX)
}

/// Destroy a queue, first waiting for it to drop below full
///
/// # Safety
/// * `queue` must be a valid handle or NULL; it is invalid afterwards
/// * No producer may keep pushing, and no other thread may use the handle
///   once this returns
#[no_mangle]
pub unsafe extern "C" fn rust_event_queue_destroy(queue: *mut RustEventQueue) {
    if !queue.is_null() {
        let queue = Box::from_raw(queue as *mut TokenQueue);
        queue.destroy();
    }
}
