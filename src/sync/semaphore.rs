//! # Binary semaphore
//! It's the mutex's state machine without the data and without the owner.
//!
//! A mutex guard has to be released by the thread that made it. The room of a reader-writer
//! lock doesn't work like that: the first reader takes the room on behalf of all the readers
//! and the last one to leave gives it back, and those are usually different threads.
//! So the semaphore hands out no guard, [BinarySemaphore::release] is a plain method instead.
//!
//! The state has 3 values so the releasing side can skip the wake syscall if nobody waits:
//! - 0 - free
//! - 1 - held, no other threads
//! - 2 - held, other threads are (possibly) waiting
//!
//! Acquiring spins a bit first, as the room and the turnstile are often held for brief moments only.
//! There's no reentrancy: a thread acquiring a semaphore it already holds waits forever.

use std::{
    hint,
    sync::atomic::{
        AtomicU32,
        Ordering::{Acquire, Relaxed, Release},
    },
};

use atomic_wait::{wait, wake_one};

use crate::error::ProtocolError;

const FREE: u32 = 0;
const HELD: u32 = 1;
const CONTENDED: u32 = 2;

pub struct BinarySemaphore {
    /// used in diagnostics only
    name: &'static str,
    state: AtomicU32,
}

impl BinarySemaphore {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            state: AtomicU32::new(FREE),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Blocks until the semaphore is free, then takes it. No timeouts.
    pub fn acquire(&self) {
        if self
            .state
            .compare_exchange(FREE, HELD, Acquire, Relaxed)
            .is_err()
        {
            Self::acquire_contended(&self.state);
        }
    }

    pub fn try_acquire(&self) -> bool {
        self.state
            .compare_exchange(FREE, HELD, Acquire, Relaxed)
            .is_ok()
    }

    #[cold]
    fn acquire_contended(state: &AtomicU32) {
        let mut spin_count = 0;

        // only spin while nobody has given up yet, 2 means there are sleepers already
        while state.load(Relaxed) == HELD && spin_count < 100 {
            spin_count += 1;
            hint::spin_loop();
        }

        if state.compare_exchange(FREE, HELD, Acquire, Relaxed).is_ok() {
            return;
        }

        // leave 2 behind so the releasing thread knows to wake somebody
        while state.swap(CONTENDED, Acquire) != FREE {
            wait(state, CONTENDED);
        }
    }

    /// Gives the semaphore back, whoever took it.
    /// Releasing a free semaphore means the protocol above is broken.
    pub fn release(&self) -> Result<(), ProtocolError> {
        match self.state.swap(FREE, Release) {
            FREE => Err(ProtocolError::ReleaseUnheld {
                semaphore: self.name,
            }),
            CONTENDED => {
                wake_one(&self.state);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// A snapshot, it may be stale by the time it's looked at
    pub fn is_held(&self) -> bool {
        self.state.load(Relaxed) != FREE
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::atomic::AtomicUsize,
        thread::{scope, sleep},
        time::Duration,
    };

    use super::*;

    #[test]
    fn test_release_by_another_thread() {
        let room = BinarySemaphore::new("room");
        room.acquire();
        assert!(room.is_held());

        scope(|s| {
            s.spawn(|| room.release().unwrap());
        });

        assert!(!room.is_held());
        assert!(room.try_acquire());
        room.release().unwrap();
    }

    #[test]
    fn test_release_unheld_is_a_violation() {
        let turnstile = BinarySemaphore::new("turnstile");
        assert_eq!(
            turnstile.release(),
            Err(ProtocolError::ReleaseUnheld {
                semaphore: "turnstile"
            })
        );
    }

    #[test]
    fn test_waiter_gets_woken() {
        let room = BinarySemaphore::new("room");
        let entered = AtomicUsize::new(0);
        room.acquire();

        scope(|s| {
            s.spawn(|| {
                room.acquire();
                entered.fetch_add(1, Relaxed);
                room.release().unwrap();
            });
            // give the other thread time to go to sleep on the state
            sleep(Duration::from_millis(50));
            assert_eq!(entered.load(Relaxed), 0);
            room.release().unwrap();
        });

        assert_eq!(entered.load(Relaxed), 1);
        assert!(!room.is_held());
    }

    #[test]
    fn test_exclusive() {
        let room = BinarySemaphore::new("room");
        let inside = AtomicUsize::new(0);
        scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        room.acquire();
                        assert_eq!(inside.fetch_add(1, Relaxed), 0);
                        inside.fetch_sub(1, Relaxed);
                        room.release().unwrap();
                    }
                });
            }
        });
        assert!(!room.is_held());
    }
}
