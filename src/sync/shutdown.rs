//! # Shutdown signal
//! A cooperative cancellation flag. Workers poll it between iterations, never in the middle of a
//! hold, so nobody is ever interrupted inside the room.
//!
//! The flag is an `AtomicU32` rather than a bool so that [ShutdownSignal::wait] can sleep on it.

use std::sync::{
    atomic::{
        AtomicU32,
        Ordering::{Acquire, Release},
    },
    Arc,
};

use atomic_wait::{wait, wake_all};
use log::info;

const RUNNING: u32 = 0;
const TRIGGERED: u32 = 1;

#[derive(Clone, Default)]
pub struct ShutdownSignal {
    flag: Arc<AtomicU32>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag, once. Returns true if it's this call that did it.
    pub fn trigger(&self) -> bool {
        let first = self.flag.swap(TRIGGERED, Release) == RUNNING;
        if first {
            info!("shutdown triggered");
            // a single notification wakes every waiter, there won't be another one
            wake_all(&*self.flag);
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Acquire) == TRIGGERED
    }

    /// Blocks until someone triggers the signal. Returns immediately if it's already set.
    pub fn wait(&self) {
        while self.flag.load(Acquire) == RUNNING {
            // spurious wakeups just go around the loop
            wait(&self.flag, RUNNING);
        }
    }
}
