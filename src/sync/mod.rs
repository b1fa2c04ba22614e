//! # Building blocks
//!
//! The reader-writer protocol is composed out of the small pieces below, all of them made the
//! same way: an `AtomicU32` that can be waited on and woken through the
//! [atomic-wait](https://crates.io/crates/atomic-wait) crate.
//! - [BinarySemaphore] - a 0/1 flag that any thread may release, not only the one that took it
//! - [Mutex] - a value behind a binary semaphore with an RAII guard
//! - [ShutdownSignal] - a write-once flag everyone polls and anyone may wait on

pub mod mutex;
pub mod semaphore;
pub mod shutdown;

pub use mutex::{Mutex, MutexGuard};
pub use semaphore::BinarySemaphore;
pub use shutdown::ShutdownSignal;
