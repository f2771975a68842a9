//! Bounded blocking event queue.
//!
//! A fixed-capacity ring buffer shared by any number of producers and
//! consumers. `push` blocks while the queue is full and `pop` blocks while it
//! is empty; that backpressure is the only flow control. Items come out in the
//! order they went in. No item is lost or duplicated, but contending producers
//! (or consumers) are released in no particular order.

use std::fmt;
use std::sync::Arc;

use log::debug;
use parking_lot::{Condvar, Mutex};

use super::{Result, ThreadError};

/// Occupancy of a queue at one instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Empty,
    Partial,
    Full,
}

struct Ring<T> {
    slots: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    size: usize,
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            size: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn is_full(&self) -> bool {
        self.size == self.capacity()
    }

    /// Store at `tail`, or hand the item back if there is no room
    fn try_push(&mut self, item: T) -> std::result::Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.slots[self.tail] = Some(item);
        self.tail = (self.tail + 1) % self.capacity();
        self.size += 1;
        Ok(())
    }

    fn try_pop(&mut self) -> Option<T> {
        if self.size == 0 {
            return None;
        }
        let item = self.slots[self.head].take();
        self.head = (self.head + 1) % self.capacity();
        self.size -= 1;
        item
    }

    fn state(&self) -> QueueState {
        match self.size {
            0 => QueueState::Empty,
            n if n == self.capacity() => QueueState::Full,
            _ => QueueState::Partial,
        }
    }
}

struct Shared<T> {
    ring: Mutex<Ring<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

/// Handle to a bounded FIFO of `T`
///
/// Clones refer to the same queue. The ring storage is freed when the last
/// handle goes away.
pub struct EventQueue<T> {
    shared: Arc<Shared<T>>,
    capacity: usize,
}

impl<T> EventQueue<T> {
    /// Create an empty queue holding at most `capacity` items
    ///
    /// # Errors
    /// Returns `ThreadError::InvalidCapacity` if `capacity` is zero
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(ThreadError::InvalidCapacity);
        }
        Ok(Self {
            shared: Arc::new(Shared {
                ring: Mutex::new(Ring::new(capacity)),
                not_full: Condvar::new(),
                not_empty: Condvar::new(),
            }),
            capacity,
        })
    }

    /// Append `item`, blocking while the queue is full
    pub fn push(&self, item: T) {
        let mut ring = self.shared.ring.lock();
        let mut item = item;
        loop {
            match ring.try_push(item) {
                Ok(()) => break,
                Err(back) => {
                    item = back;
                    self.shared.not_full.wait(&mut ring);
                }
            }
        }
        drop(ring);
        self.shared.not_empty.notify_all();
    }

    /// Remove the oldest item, blocking while the queue is empty
    pub fn pop(&self) -> T {
        let mut ring = self.shared.ring.lock();
        let item = loop {
            if let Some(item) = ring.try_pop() {
                break item;
            }
            self.shared.not_empty.wait(&mut ring);
        };
        drop(ring);
        self.shared.not_full.notify_all();
        item
    }

    /// Number of queued items right now
    ///
    /// Only a snapshot: other threads may change it before the caller looks.
    pub fn len(&self) -> usize {
        self.shared.ring.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.shared.ring.lock().is_full()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> QueueState {
        self.shared.ring.lock().state()
    }

    /// Tear down this handle
    ///
    /// If the queue is full this waits until a consumer drains it below
    /// capacity before letting go. The caller must make sure no producer keeps
    /// refilling it, otherwise this can stall forever.
    pub fn destroy(self) {
        let mut ring = self.shared.ring.lock();
        while ring.is_full() {
            self.shared.not_full.wait(&mut ring);
        }
        debug!(
            "event queue destroyed with {} of {} slots in use",
            ring.size, self.capacity
        );
    }
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            capacity: self.capacity,
        }
    }
}

impl<T> fmt::Debug for EventQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.shared.ring.lock();
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity)
            .field("size", &ring.size)
            .field("head", &ring.head)
            .field("tail", &ring.tail)
            .finish()
    }
}
