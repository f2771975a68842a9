//! Per-worker wake signal.
//!
//! A mutex/condition pair with edge-triggered semantics: [`WakeSignal::wake`]
//! releases a worker that is already asleep and is dropped on the floor when
//! nobody is. Wakes are never counted or queued for a later sleeper, so a
//! worker must re-check whatever it was waiting for after it resumes.
//!
//! Sleepers take a ticket on the way in and each delivered wake releases the
//! oldest outstanding ticket, so a `true` from [`WakeSignal::wake`] always
//! stands for exactly one sleeper returning.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct WakeState {
    /// Tickets handed to sleepers so far
    issued: u64,
    /// Tickets below this have been released
    released: u64,
}

impl WakeState {
    fn sleepers(&self) -> usize {
        (self.issued - self.released) as usize
    }
}

#[derive(Debug, Default)]
pub struct WakeSignal {
    state: Mutex<WakeState>,
    cond: Condvar,
}

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until a [`wake`](Self::wake) arrives after this call started
    pub fn sleep(&self) {
        let mut state = self.state.lock();
        let ticket = state.issued;
        state.issued += 1;
        while state.released <= ticket {
            self.cond.wait(&mut state);
        }
    }

    /// Release one sleeper
    ///
    /// Returns `false` when every sleeper had already been released, in which
    /// case the wake is lost.
    pub fn wake(&self) -> bool {
        let mut state = self.state.lock();
        if state.sleepers() == 0 {
            return false;
        }
        state.released += 1;
        self.cond.notify_all();
        true
    }

    /// Number of threads parked in [`sleep`](Self::sleep) and not yet released
    ///
    /// A non-zero answer means a `wake` issued now will be delivered.
    pub fn sleepers(&self) -> usize {
        self.state.lock().sleepers()
    }
}
