//! # Harness
//! Wires a run together: the lock, the initial workers, reader growth and the monitor.
//! Then it waits for something outside to say stop, sets the shutdown signal and joins
//! everything it started, background threads included, before handing out the [Report].

use std::{
    io::{self, BufRead, Write},
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use log::{error, info, warn};

use crate::{
    config::Config,
    error::{Error, Result},
    monitor::{Monitor, Sample},
    pool::{spawn_named, Visits, WorkerPool},
    rwlock::{RwLock, Variant},
    sync::ShutdownSignal,
};

/// Something to block on until the run should stop.
/// A source that can't deliver anymore (closed channel, EOF) means stop as well.
pub trait ShutdownSource {
    fn wait_for_stop(self, shutdown: &ShutdownSignal);
}

/// A timed run. Ends early if the signal gets set from the inside, e.g. by a failing worker.
impl ShutdownSource for Duration {
    fn wait_for_stop(self, shutdown: &ShutdownSignal) {
        let deadline = Instant::now() + self;
        while !shutdown.is_triggered() {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                info!("run time of {self:?} is over");
                return;
            }
            thread::sleep(left.min(Duration::from_millis(10)));
        }
    }
}

impl ShutdownSource for mpsc::Receiver<()> {
    fn wait_for_stop(self, _: &ShutdownSignal) {
        match self.recv() {
            Ok(()) => info!("stop requested"),
            Err(_) => warn!("stop channel closed, stopping"),
        }
    }
}

/// Another handle's trigger
impl ShutdownSource for ShutdownSignal {
    fn wait_for_stop(self, _: &ShutdownSignal) {
        self.wait();
    }
}

/// A line on stdin. EOF or a read error stop the run too.
pub struct StdinLine;

impl ShutdownSource for StdinLine {
    fn wait_for_stop(self, _: &ShutdownSignal) {
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => warn!("stdin closed, stopping"),
            Ok(_) => info!("stop requested"),
            Err(e) => warn!("can't read stdin ({e}), stopping"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub variant: Variant,
    pub samples: Vec<Sample>,
    /// initial and grown ones
    pub readers_spawned: usize,
    pub writers: usize,
    pub reads: usize,
    pub writes: usize,
}

impl Report {
    pub fn max_readers_observed(&self) -> usize {
        self.samples.iter().map(|s| s.readers).max().unwrap_or(0)
    }

    /// Fraction of samples that caught a writer inside
    pub fn writer_share(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let writing = self.samples.iter().filter(|s| s.writers > 0).count();
        writing as f64 / self.samples.len() as f64
    }

    pub fn write_csv(&self, mut out: impl Write) -> io::Result<()> {
        writeln!(out, "seconds,readers,writers")?;
        for sample in &self.samples {
            writeln!(out, "{sample}")?;
        }
        out.flush()
    }
}

pub struct Harness {
    config: Config,
    lock: Arc<RwLock>,
    shutdown: ShutdownSignal,
    pool: Arc<WorkerPool>,
    monitor: Arc<Monitor>,
    growth: Option<JoinHandle<Result<usize>>>,
    sampler: Option<JoinHandle<usize>>,
}

impl Harness {
    /// Starts everything. If anything fails to start, whatever did start is stopped and joined.
    pub fn start(config: Config) -> Result<Self> {
        config.validate()?;

        let lock = Arc::new(RwLock::new(config.variant));
        let shutdown = ShutdownSignal::new();
        let pool = Arc::new(WorkerPool::new(
            lock.clone(),
            shutdown.clone(),
            config.timing(),
            config.max_readers,
        ));
        let monitor = Arc::new(Monitor::new(lock.clone()));
        info!("starting a {} run: {config:?}", config.variant);

        let mut harness = Self {
            config,
            lock,
            shutdown,
            pool,
            monitor,
            growth: None,
            sampler: None,
        };
        if let Err(e) = harness.launch() {
            error!("start failed: {e}");
            harness.shutdown.trigger();
            let _ = harness.finish();
            return Err(e);
        }
        Ok(harness)
    }

    fn launch(&mut self) -> Result<()> {
        self.pool
            .spawn_initial(self.config.readers, self.config.writers)?;

        if let Some(interval) = self.config.growth_interval {
            let pool = self.pool.clone();
            self.growth = Some(spawn_named("reader growth".to_string(), move || {
                pool.grow_readers(interval)
            })?);
        }

        let monitor = self.monitor.clone();
        let shutdown = self.shutdown.clone();
        let interval = self.config.sample_interval;
        self.sampler = Some(spawn_named("monitor".to_string(), move || {
            monitor.sample_loop(interval, &shutdown)
        })?);
        Ok(())
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn lock(&self) -> &RwLock {
        &self.lock
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Blocks on the source, then stops the run
    pub fn run_until(self, source: impl ShutdownSource) -> Result<Report> {
        source.wait_for_stop(&self.shutdown);
        self.stop()
    }

    pub fn stop(mut self) -> Result<Report> {
        self.shutdown.trigger();
        self.finish()
    }

    /// Joins growth first: after that the set of workers is final and all of them can be joined.
    /// The monitor goes last so the series covers the whole wind-down.
    fn finish(&mut self) -> Result<Report> {
        let mut failure = None;

        if let Some(growth) = self.growth.take() {
            match growth.join() {
                Ok(Ok(grown)) => info!("reader growth added {grown} readers"),
                Ok(Err(e)) => failure = Some(e),
                Err(_) => failure = Some(Error::WorkerPanicked("reader growth".to_string())),
            }
        }

        let visits = match self.pool.join_all() {
            Ok(visits) => visits,
            Err(e) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                Visits::default()
            }
        };

        if let Some(sampler) = self.sampler.take() {
            match sampler.join() {
                Ok(taken) => info!("monitor took {taken} samples"),
                Err(_) if failure.is_none() => {
                    failure = Some(Error::WorkerPanicked("monitor".to_string()));
                }
                Err(_) => error!("monitor panicked"),
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }
        Ok(Report {
            variant: self.config.variant,
            samples: self.monitor.samples(),
            readers_spawned: self.pool.reader_count(),
            writers: self.pool.writer_count(),
            reads: visits.reads,
            writes: visits.writes,
        })
    }
}

/// A harness dropped without [Harness::stop] still doesn't leave threads behind
impl Drop for Harness {
    fn drop(&mut self) {
        if self.sampler.is_some() || self.growth.is_some() || self.pool.pending_joins() > 0 {
            self.shutdown.trigger();
            if let Err(e) = self.finish() {
                error!("run dropped with a failure: {e}");
            }
        }
    }
}
