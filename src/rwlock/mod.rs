//! # Reader-writer lock
//! The room (critical section) can be taken by any number of readers or by exactly one writer.
//!
//! It's composed out of the [crate::sync] blocks:
//! - a counter of readers behind its own mutex
//! - the room, a binary semaphore: the first reader takes it for the whole reader group,
//!   the last reader gives it back, a writer takes it for itself
//! - the turnstile, another binary semaphore, in the [Variant::Fair] lock only
//!
//! ## Naive variant
//! Readers never wait for a writer that's waiting: as long as there's at least one reader inside,
//! a new reader just bumps the counter and walks in. If readers keep arriving faster than they
//! leave, the counter never drops to 0 and the writer never gets the room. It's kept to show exactly that.
//!
//! ## Fair variant
//! A writer takes the turnstile, then the room, then lets the turnstile go.
//! A reader passes the turnstile (takes and immediately releases it) before touching the counter.
//!
//! Once a writer holds the turnstile, everyone who hasn't passed it yet queues behind the writer.
//! Readers already inside finish normally, the last of them frees the room, the writer walks in.
//! Readers don't block each other any more than in the naive lock, the turnstile is held for an instant by them.
//!
//! Acquisition is scoped: [RwLock::enter_read] and [RwLock::enter_write] hand out guards and
//! the matching exit happens when the guard is dropped, unwinding included.

mod occupancy;

use std::thread;

use log::{debug, error};
use strum_macros::{Display, EnumIter, EnumString};

pub use occupancy::Occupancy;

use crate::{
    error::ProtocolError,
    sync::{BinarySemaphore, Mutex},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, EnumIter, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Variant {
    /// readers-preference, writers may starve
    Naive,
    /// turnstile in front of the room, writers get in in bounded time
    #[default]
    Fair,
}

pub struct RwLock {
    variant: Variant,
    /// readers that went past the entry protocol and haven't left yet
    readers: Mutex<usize>,
    room: BinarySemaphore,
    turnstile: Option<BinarySemaphore>,
    occupancy: Mutex<Occupancy>,
}

impl RwLock {
    pub fn new(variant: Variant) -> Self {
        Self {
            variant,
            readers: Mutex::new("reader counter", 0),
            room: BinarySemaphore::new("room"),
            turnstile: match variant {
                Variant::Naive => None,
                Variant::Fair => Some(BinarySemaphore::new("turnstile")),
            },
            occupancy: Mutex::new("occupancy", Occupancy::default()),
        }
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn enter_read(&self) -> Result<ReadGuard<'_>, ProtocolError> {
        if let Some(turnstile) = &self.turnstile {
            // wait behind a writer that claimed it, if any
            turnstile.acquire();
            turnstile.release()?;
        }

        {
            let mut readers = self.readers.lock();
            *readers += 1;
            if *readers == 1 {
                // the counter stays locked meanwhile => the readers behind us wait too
                self.room.acquire();
                debug!("room taken by the reader group");
            }
        }

        let admitted = self.occupancy.lock().admit_reader();
        if let Err(violation) = admitted {
            // the admission failure is the one to report
            let _ = self.leave_as_reader();
            return Err(violation);
        }
        Ok(ReadGuard {
            lock: self,
            exited: false,
        })
    }

    pub fn enter_write(&self) -> Result<WriteGuard<'_>, ProtocolError> {
        match &self.turnstile {
            Some(turnstile) => {
                turnstile.acquire();
                debug!("turnstile claimed by a writer");
                self.room.acquire();
                if let Err(violation) = turnstile.release() {
                    let _ = self.room.release();
                    return Err(violation);
                }
            }
            None => self.room.acquire(),
        }

        let admitted = self.occupancy.lock().admit_writer();
        if let Err(violation) = admitted {
            let _ = self.room.release();
            return Err(violation);
        }
        Ok(WriteGuard {
            lock: self,
            exited: false,
        })
    }

    /// What the room looks like at this instant. Touches neither the room nor the turnstile.
    pub fn occupancy(&self) -> Occupancy {
        *self.occupancy.lock()
    }

    pub fn is_room_occupied(&self) -> bool {
        self.room.is_held()
    }

    /// Always false for the naive lock
    pub fn is_turnstile_claimed(&self) -> bool {
        self.turnstile.as_ref().is_some_and(BinarySemaphore::is_held)
    }

    fn exit_read(&self) -> Result<(), ProtocolError> {
        self.occupancy.lock().dismiss_reader()?;
        self.leave_as_reader()
    }

    fn leave_as_reader(&self) -> Result<(), ProtocolError> {
        let mut readers = self.readers.lock();
        *readers = readers
            .checked_sub(1)
            .ok_or(ProtocolError::ExitUnderflow { role: "reader" })?;
        if *readers == 0 {
            debug!("room released by the last reader");
            self.room.release()?;
        }
        Ok(())
    }

    fn exit_write(&self) -> Result<(), ProtocolError> {
        self.occupancy.lock().dismiss_writer()?;
        self.room.release()
    }
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new(Variant::default())
    }
}

/// A failed exit can't be returned from a drop
fn exit_failed(violation: ProtocolError) {
    if thread::panicking() {
        // a second panic would abort the process and lose the first one
        error!("protocol violation while unwinding: {violation}");
    } else {
        panic!("protocol violation: {violation}");
    }
}

/// Proof of being inside the room as a reader
pub struct ReadGuard<'a> {
    lock: &'a RwLock,
    exited: bool,
}

impl ReadGuard<'_> {
    /// Leaves the room reporting a violation instead of panicking on it
    pub fn exit(mut self) -> Result<(), ProtocolError> {
        self.exited = true;
        self.lock.exit_read()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        if !self.exited {
            if let Err(violation) = self.lock.exit_read() {
                exit_failed(violation);
            }
        }
    }
}

/// Proof of being alone in the room
pub struct WriteGuard<'a> {
    lock: &'a RwLock,
    exited: bool,
}

impl WriteGuard<'_> {
    pub fn exit(mut self) -> Result<(), ProtocolError> {
        self.exited = true;
        self.lock.exit_write()
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if !self.exited {
            if let Err(violation) = self.lock.exit_write() {
                exit_failed(violation);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{
            atomic::{
                AtomicBool, AtomicUsize,
                Ordering::{Relaxed, SeqCst},
            },
            Barrier,
        },
        thread::{scope, sleep},
        time::{Duration, Instant},
    };

    use strum::IntoEnumIterator;

    use super::*;

    /// spin-sleeps until the condition holds, gives up after a few seconds
    fn eventually(what: &str, condition: impl Fn() -> bool) {
        let started = Instant::now();
        while !condition() {
            assert!(
                started.elapsed() < Duration::from_secs(5),
                "timed out waiting for {what}"
            );
            sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_mutual_exclusion() {
        for variant in Variant::iter() {
            let lock = RwLock::new(variant);
            let readers_inside = AtomicUsize::new(0);
            let writers_inside = AtomicUsize::new(0);

            scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        for _ in 0..200 {
                            let _guard = lock.enter_write().unwrap();
                            assert_eq!(writers_inside.fetch_add(1, SeqCst), 0);
                            assert_eq!(readers_inside.load(SeqCst), 0);
                            writers_inside.fetch_sub(1, SeqCst);
                        }
                    });
                    s.spawn(|| {
                        for _ in 0..200 {
                            let _guard = lock.enter_read().unwrap();
                            readers_inside.fetch_add(1, SeqCst);
                            assert_eq!(writers_inside.load(SeqCst), 0);
                            readers_inside.fetch_sub(1, SeqCst);
                        }
                    });
                }
            });

            assert!(lock.occupancy().is_empty(), "{variant} left someone inside");
            assert!(!lock.is_room_occupied());
        }
    }

    #[test]
    fn test_readers_share_the_room() {
        for variant in Variant::iter() {
            let lock = RwLock::new(variant);
            // the two readers and this thread
            let both_inside = Barrier::new(3);
            let may_leave = Barrier::new(3);
            scope(|s| {
                for _ in 0..2 {
                    s.spawn(|| {
                        let _guard = lock.enter_read().unwrap();
                        both_inside.wait();
                        may_leave.wait();
                    });
                }

                both_inside.wait();
                // nobody leaves before may_leave, so the room stays shared for the whole window
                for _ in 0..5 {
                    assert_eq!(
                        lock.occupancy(),
                        Occupancy {
                            readers: 2,
                            writers: 0
                        },
                        "{variant}"
                    );
                    sleep(Duration::from_millis(4));
                }
                assert!(lock.is_room_occupied());
                may_leave.wait();
            });
            assert!(lock.occupancy().is_empty());
            assert!(!lock.is_room_occupied());
        }
    }

    #[test]
    fn test_writer_goes_before_queued_readers() {
        let lock = RwLock::new(Variant::Fair);
        let order = Mutex::new("order", Vec::new());
        let first = lock.enter_read().unwrap();

        scope(|s| {
            s.spawn(|| {
                let _guard = lock.enter_write().unwrap();
                order.lock().push("writer");
                sleep(Duration::from_millis(20));
            });

            // the writer is past the turnstile's acquire and stuck on the room
            eventually("the writer to claim the turnstile", || {
                lock.is_turnstile_claimed()
            });

            for _ in 0..5 {
                s.spawn(|| {
                    let _guard = lock.enter_read().unwrap();
                    order.lock().push("reader");
                });
            }

            sleep(Duration::from_millis(50));
            assert!(order.lock().is_empty(), "somebody got past the turnstile");
            assert_eq!(lock.occupancy().readers, 1);

            drop(first);
        });

        let order = order.into_inner();
        assert_eq!(order.len(), 6);
        assert_eq!(order[0], "writer");
    }

    #[test]
    fn test_naive_readers_overtake_waiting_writer() {
        let lock = RwLock::new(Variant::Naive);
        let writer_entered = AtomicBool::new(false);

        let mut current = lock.enter_read().unwrap();
        scope(|s| {
            s.spawn(|| {
                let _guard = lock.enter_write().unwrap();
                writer_entered.store(true, Relaxed);
            });
            sleep(Duration::from_millis(20));

            // a relay of readers: the next one is in before the previous one leaves,
            // so the room never empties and the writer waits for as long as the relay runs
            let started = Instant::now();
            for _ in 0..10 {
                let next = lock.enter_read().unwrap();
                drop(current);
                current = next;
                sleep(Duration::from_millis(10));
                assert!(!writer_entered.load(Relaxed));
            }
            assert!(started.elapsed() >= Duration::from_millis(100));

            drop(current);
        });

        assert!(writer_entered.load(Relaxed));
        assert!(lock.occupancy().is_empty());
    }

    #[test]
    fn test_fair_writer_gets_in_under_reader_load() {
        let lock = RwLock::new(Variant::Fair);
        let stop = AtomicBool::new(false);

        scope(|s| {
            // readers with no rest between visits keep the room busy all the time
            for _ in 0..6 {
                s.spawn(|| {
                    while !stop.load(Relaxed) {
                        let _guard = lock.enter_read().unwrap();
                        sleep(Duration::from_millis(5));
                    }
                });
            }
            sleep(Duration::from_millis(30));

            let started = Instant::now();
            let guard = lock.enter_write().unwrap();
            let waited = started.elapsed();
            assert_eq!(lock.occupancy().readers, 0);
            drop(guard);
            stop.store(true, Relaxed);

            assert!(waited < Duration::from_secs(1), "writer waited {waited:?}");
        });
    }

    #[test]
    fn test_explicit_exit() {
        let lock = RwLock::default();
        assert_eq!(lock.variant(), Variant::Fair);

        let reader = lock.enter_read().unwrap();
        assert!(lock.is_room_occupied());
        reader.exit().unwrap();
        assert!(!lock.is_room_occupied());

        let writer = lock.enter_write().unwrap();
        assert_eq!(
            lock.occupancy(),
            Occupancy {
                readers: 0,
                writers: 1
            }
        );
        writer.exit().unwrap();
        assert!(lock.occupancy().is_empty());
    }

    #[test]
    fn test_unwinding_writer_releases_the_room() {
        let lock = RwLock::new(Variant::Fair);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = lock.enter_write().unwrap();
            panic!("writer died inside");
        }));
        assert!(result.is_err());
        assert!(!lock.is_room_occupied());
        drop(lock.enter_read().unwrap());
    }
}
