pub mod config;
pub mod error;
pub mod harness;
pub mod monitor;
pub mod pool;
pub mod rwlock;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use harness::{Harness, Report, ShutdownSource, StdinLine};
pub use rwlock::{RwLock, Variant};
pub use sync::ShutdownSignal;
