//! # Worker pool
//! Every worker is an OS thread looping over the same visit until the shutdown signal is set:
//! enter the room in its role, hold it for a while, leave, rest, check the signal again.
//! The signal is never checked mid-visit => a stop takes up to one hold + rest per worker.
//!
//! The pool owns every join handle. Writers are spawned once, readers may keep arriving from
//! [WorkerPool::grow_readers] until shutdown, and [WorkerPool::join_all] joins them all.

use std::{
    fmt, mem,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{debug, error, info};
use strum_macros::Display;

use crate::{
    error::{Error, ProtocolError, Result},
    rwlock::RwLock,
    sync::{Mutex, ShutdownSignal},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Reader,
    Writer,
}

/// Identities are 1-based per role and never reused, growth continues the reader numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId {
    pub role: Role,
    pub index: usize,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.role, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// time spent inside the room per visit
    pub hold: Duration,
    /// time spent outside between visits
    pub rest: Duration,
}

/// Visits completed by the joined workers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visits {
    pub reads: usize,
    pub writes: usize,
}

/// Pretends to do some work. It's a plain sleep: whatever the caller holds stays held.
pub fn simulate_hold(duration: Duration) {
    if !duration.is_zero() {
        thread::sleep(duration);
    }
}

pub(crate) fn spawn_named<Y, F>(name: String, f: F) -> Result<JoinHandle<Y>>
where
    Y: Send + 'static,
    F: FnOnce() -> Y + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(f)
        .map_err(|source| Error::Spawn { name, source })
}

pub(crate) type Visited = std::result::Result<usize, ProtocolError>;

struct Worker {
    id: WorkerId,
    handle: JoinHandle<Visited>,
}

#[derive(Default)]
struct Registry {
    readers: usize,
    writers: usize,
    workers: Vec<Worker>,
}

pub struct WorkerPool {
    lock: Arc<RwLock>,
    shutdown: ShutdownSignal,
    timing: Timing,
    /// None => growth is explicitly unbounded
    max_readers: Option<usize>,
    registry: Mutex<Registry>,
}

impl WorkerPool {
    pub fn new(
        lock: Arc<RwLock>,
        shutdown: ShutdownSignal,
        timing: Timing,
        max_readers: Option<usize>,
    ) -> Self {
        Self {
            lock,
            shutdown,
            timing,
            max_readers,
            registry: Mutex::new("worker registry", Registry::default()),
        }
    }

    pub fn spawn_initial(&self, readers: usize, writers: usize) -> Result<()> {
        let mut registry = self.registry.lock();
        for _ in 0..writers {
            self.spawn(&mut registry, Role::Writer)?;
        }
        for _ in 0..readers {
            self.spawn(&mut registry, Role::Reader)?;
        }
        info!("started {readers} readers and {writers} writers");
        Ok(())
    }

    /// Adds one reader every `interval` until shutdown (or until the reader limit).
    /// Ticks are scheduled from the start, so sleeping late doesn't accumulate.
    /// Returns how many readers it added.
    pub fn grow_readers(&self, interval: Duration) -> Result<usize> {
        let started = Instant::now();
        let mut grown = 0;
        for tick in 1u32.. {
            let due = started + interval * tick;
            thread::sleep(due.saturating_duration_since(Instant::now()));

            let mut registry = self.registry.lock();
            // checked under the registry lock => nothing gets added once join_all took the list
            if self.shutdown.is_triggered() {
                break;
            }
            if self.max_readers.is_some_and(|max| registry.readers >= max) {
                info!("reader limit of {} reached, growth stops", registry.readers);
                break;
            }
            let id = match self.spawn(&mut registry, Role::Reader) {
                Ok(id) => id,
                Err(e) => return Err(self.abort_run(e)),
            };
            debug!("{id} joined, {} readers so far", registry.readers);
            grown += 1;
        }
        Ok(grown)
    }

    /// A failure outside of any worker stops the run right away, like a failing worker does
    fn abort_run(&self, failure: Error) -> Error {
        error!("{failure}, stopping the run");
        self.shutdown.trigger();
        failure
    }

    fn spawn(&self, registry: &mut Registry, role: Role) -> Result<WorkerId> {
        let lock = self.lock.clone();
        let shutdown = self.shutdown.clone();
        let timing = self.timing;
        self.register(registry, role, move |id| {
            visit_until_shutdown(id, &lock, &shutdown, timing)
        })
    }

    /// Adds a worker running `visits` instead of the usual loop, with the same
    /// identities, registry, join and failure handling as the rest
    pub(crate) fn spawn_with<F>(&self, role: Role, visits: F) -> Result<WorkerId>
    where
        F: FnOnce(WorkerId) -> Visited + Send + 'static,
    {
        self.register(&mut self.registry.lock(), role, visits)
    }

    /// Gives the next identity of the role to a thread running `visits`
    fn register<F>(&self, registry: &mut Registry, role: Role, visits: F) -> Result<WorkerId>
    where
        F: FnOnce(WorkerId) -> Visited + Send + 'static,
    {
        let index = match role {
            Role::Reader => {
                registry.readers += 1;
                registry.readers
            }
            Role::Writer => {
                registry.writers += 1;
                registry.writers
            }
        };
        let id = WorkerId { role, index };

        let shutdown = self.shutdown.clone();
        let handle = spawn_named(id.to_string(), move || run_worker(id, &shutdown, visits))?;
        registry.workers.push(Worker { id, handle });
        Ok(id)
    }

    /// Readers ever spawned, never decreases
    pub fn reader_count(&self) -> usize {
        self.registry.lock().readers
    }

    pub fn writer_count(&self) -> usize {
        self.registry.lock().writers
    }

    /// Workers spawned and not joined yet
    pub fn pending_joins(&self) -> usize {
        self.registry.lock().workers.len()
    }

    /// Joins every worker spawned so far. Doesn't set the signal itself.
    /// All of them get joined even if some failed, the first failure is reported.
    pub fn join_all(&self) -> Result<Visits> {
        let workers = mem::take(&mut self.registry.lock().workers);
        let joined = workers.len();

        let mut visits = Visits::default();
        let mut failure = None;
        for Worker { id, handle } in workers {
            let outcome = match handle.join() {
                Ok(Ok(count)) => {
                    match id.role {
                        Role::Reader => visits.reads += count,
                        Role::Writer => visits.writes += count,
                    }
                    continue;
                }
                Ok(Err(source)) => Error::Worker {
                    worker: id.to_string(),
                    source,
                },
                Err(_) => Error::WorkerPanicked(id.to_string()),
            };
            error!("{outcome}");
            if failure.is_none() {
                failure = Some(outcome);
            }
        }

        info!(
            "joined {joined} workers after {} reads and {} writes",
            visits.reads, visits.writes
        );
        match failure {
            Some(failure) => Err(failure),
            None => Ok(visits),
        }
    }
}

/// Stops the whole run if the worker thread unwinds, e.g. with a held lock's protocol broken
struct TriggerOnPanic<'a>(&'a ShutdownSignal);

impl Drop for TriggerOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("{} panicked, stopping the run", thread::current().name().unwrap_or("worker"));
            self.0.trigger();
        }
    }
}

fn run_worker(
    id: WorkerId,
    shutdown: &ShutdownSignal,
    visits: impl FnOnce(WorkerId) -> Visited,
) -> Visited {
    let _stop_on_panic = TriggerOnPanic(shutdown);
    let visited = visits(id);
    if let Err(violation) = &visited {
        error!("{id} broke the protocol: {violation}");
        shutdown.trigger();
    }
    visited
}

fn visit_until_shutdown(
    id: WorkerId,
    lock: &RwLock,
    shutdown: &ShutdownSignal,
    timing: Timing,
) -> Visited {
    let mut visits = 0;
    while !shutdown.is_triggered() {
        match id.role {
            Role::Reader => {
                let guard = lock.enter_read()?;
                info!("{id} is reading, {} inside", lock.occupancy().readers);
                simulate_hold(timing.hold);
                guard.exit()?;
                info!("{id} stopped reading");
            }
            Role::Writer => {
                let guard = lock.enter_write()?;
                info!("{id} is writing");
                simulate_hold(timing.hold);
                guard.exit()?;
                info!("{id} stopped writing");
            }
        }
        visits += 1;
        simulate_hold(timing.rest);
    }
    debug!("{id} done after {visits} visits");
    Ok(visits)
}
