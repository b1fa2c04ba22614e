//! # Monitor
//! Samples how many readers and writers are inside the room, at a fixed cadence, into a series
//! to be plotted later. It only ever reads the lock's occupancy record: taking the room or the
//! turnstile to look would change what's being measured.

use std::{
    fmt,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use log::debug;

use crate::{
    rwlock::RwLock,
    sync::{Mutex, ShutdownSignal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// since the monitor was created
    pub at: Duration,
    pub readers: usize,
    pub writers: usize,
}

/// `seconds,readers,writers`, one CSV row
impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3},{},{}",
            self.at.as_secs_f64(),
            self.readers,
            self.writers
        )
    }
}

pub struct Monitor {
    lock: Arc<RwLock>,
    started: Instant,
    samples: Mutex<Vec<Sample>>,
}

impl Monitor {
    pub fn new(lock: Arc<RwLock>) -> Self {
        Self {
            lock,
            started: Instant::now(),
            samples: Mutex::new("samples", Vec::new()),
        }
    }

    /// Records one sample. The series stays strictly ordered by time:
    /// a sample that isn't later than the last one is dropped and None is returned.
    pub fn sample(&self) -> Option<Sample> {
        let mut samples = self.samples.lock();
        // both counts come from a single snapshot
        let occupancy = self.lock.occupancy();
        let sample = Sample {
            at: self.started.elapsed(),
            readers: occupancy.readers,
            writers: occupancy.writers,
        };
        if samples.last().is_some_and(|last| last.at >= sample.at) {
            return None;
        }
        samples.push(sample);
        Some(sample)
    }

    /// Samples every `interval` until shutdown, returns the number of samples taken.
    pub fn sample_loop(&self, interval: Duration, shutdown: &ShutdownSignal) -> usize {
        let mut taken = 0;
        for tick in 1u32.. {
            if shutdown.is_triggered() {
                break;
            }
            if let Some(sample) = self.sample() {
                debug!("sampled {sample}");
                taken += 1;
            }
            let due = self.started + interval * tick;
            thread::sleep(due.saturating_duration_since(Instant::now()));
        }
        taken
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.samples.lock().clone()
    }
}
