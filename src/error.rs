//! # Errors
//!
//! Protocol violations are defects, not conditions to recover from: whoever sees one
//! stops the run and reports which invariant failed.

use std::io;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{semaphore} released while not held")]
    ReleaseUnheld { semaphore: &'static str },

    #[error("writer entered the room while {readers} reader(s) were inside")]
    WriterWithReaders { readers: usize },

    #[error("writer entered the room while another writer was inside")]
    ConcurrentWriters,

    #[error("reader entered the room while a writer was inside")]
    ReaderWithWriter,

    #[error("{role} left the room but none was inside")]
    ExitUnderflow { role: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown variant {0:?}, use one of {1}")]
    UnknownVariant(String, String),

    #[error("unknown setting {0:?}, use one of {1}")]
    UnknownSetting(String, String),

    #[error("setting {0:?} isn't a key=value pair")]
    Malformed(String),

    #[error("{setting} expects a non-negative integer, got {value:?}")]
    InvalidNumber { setting: String, value: String },

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("nothing to run: no readers and no writers")]
    Empty,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("{worker} failed: {source}")]
    Worker {
        worker: String,
        #[source]
        source: ProtocolError,
    },

    #[error("{0} panicked")]
    WorkerPanicked(String),
}

pub type Result<T> = std::result::Result<T, Error>;
