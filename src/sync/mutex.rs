//! # Mutex
//! A value protected by a [BinarySemaphore]. Unlike the room, the mutex is always released by the
//! thread that locked it, so the usual guard works: it's the only way to get to the value
//! and dropping it is the only way to unlock.
//!
//! There's no poisoning. A thread that panics while holding the guard still unlocks on unwind.

use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

use super::BinarySemaphore;

pub struct Mutex<Y> {
    semaphore: BinarySemaphore,
    value: UnsafeCell<Y>,
}

/// promise to the compiler that it's safe to share if the underlying value is safe to send
unsafe impl<Y> Sync for Mutex<Y> where Y: Send {}

impl<Y> Mutex<Y> {
    pub const fn new(name: &'static str, value: Y) -> Self {
        Self {
            semaphore: BinarySemaphore::new(name),
            value: UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Y> {
        self.semaphore.acquire();
        MutexGuard { mutex: self }
    }

    pub fn into_inner(self) -> Y {
        self.value.into_inner()
    }
}

pub struct MutexGuard<'a, Y> {
    mutex: &'a Mutex<Y>,
}

unsafe impl<Y> Sync for MutexGuard<'_, Y> where Y: Sync {}

impl<Y> Deref for MutexGuard<'_, Y> {
    type Target = Y;
    fn deref(&self) -> &Self::Target {
        // SAFETY: existence of the guard means the semaphore is held by us
        unsafe { &*self.mutex.value.get() }
    }
}

impl<Y> DerefMut for MutexGuard<'_, Y> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: existence of the guard means the semaphore is held by us
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<Y> Drop for MutexGuard<'_, Y> {
    fn drop(&mut self) {
        // the guard proves the semaphore is held, so the release can't fail
        let released = self.mutex.semaphore.release();
        debug_assert!(released.is_ok(), "{} unlocked twice", self.mutex.semaphore.name());
    }
}
