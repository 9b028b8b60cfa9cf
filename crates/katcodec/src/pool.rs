//! Bounded, optionally blocking pool of heavyweight reusable objects.
//!
//! The pool only tracks idle instances and how many it has created.
//! Exclusivity comes from the instances themselves: [`Poolable::lock`]
//! refuses an instance that is still busy, so one can never be lent twice
//! before its matching [`ObjectPool::retreat`].

use core::{
    fmt,
    ops::{Deref, DerefMut},
    time::Duration,
};
use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use crate::options::WorkerOptions;

/// Busy-flag contract of pooled objects.
pub trait Poolable: Send {
    /// Marks the instance busy. Returns `false` if it already was.
    fn lock(&mut self) -> bool;

    /// Resets the instance and marks it idle. Returns `false` if it was not
    /// busy, in which case the pool drops it.
    fn unlock(&mut self) -> bool;
}

struct PoolState<T> {
    idle: Vec<T>,
    grown: usize,
}

/// LIFO pool of at most `size` idle instances.
pub struct ObjectPool<T> {
    make: Box<dyn Fn() -> T + Send + Sync>,
    state: Mutex<PoolState<T>>,
    returned: Condvar,
    size: usize,
    blocking: bool,
    wait_interval: Duration,
    borrow_timeout: Duration,
}

impl<T: Poolable> ObjectPool<T> {
    pub fn new(options: &WorkerOptions, make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            make: Box::new(make),
            state: Mutex::new(PoolState {
                idle: Vec::with_capacity(options.size),
                grown: 0,
            }),
            returned: Condvar::new(),
            size: options.size,
            blocking: options.blocking,
            wait_interval: options.wait_interval(),
            borrow_timeout: options.borrow_timeout(),
        }
    }

    fn state(&self) -> MutexGuard<'_, PoolState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fresh(&self) -> T {
        let mut item = (self.make)();
        item.lock();
        item
    }

    /// Lends an idle instance, or a new one while fewer than `size` have
    /// been created.
    ///
    /// At the ceiling a blocking pool waits for a [`retreat`](Self::retreat)
    /// in `wait_interval` steps; once `borrow_timeout` has passed it creates
    /// a fresh instance anyway. A non-blocking pool creates one immediately.
    pub fn borrow(&self) -> T {
        let deadline = Instant::now() + self.borrow_timeout;
        let mut state = self.state();
        loop {
            while let Some(mut item) = state.idle.pop() {
                if item.lock() {
                    return item;
                }
                tracing::debug!(target: "katcodec::pool", "discarding busy pooled instance");
            }

            if state.grown < self.size {
                state.grown += 1;
                tracing::debug!(target: "katcodec::pool", grown = state.grown, size = self.size, "creating pooled instance");
                drop(state);
                return self.fresh();
            }

            if !self.blocking {
                drop(state);
                tracing::debug!(target: "katcodec::pool", size = self.size, "pool exhausted, creating extra instance");
                return self.fresh();
            }

            let now = Instant::now();
            if now >= deadline {
                drop(state);
                tracing::warn!(
                    target: "katcodec::pool",
                    timeout_ms = u64::try_from(self.borrow_timeout.as_millis()).unwrap_or(u64::MAX),
                    "timed out waiting for a pooled instance, creating extra instance"
                );
                return self.fresh();
            }

            let wait = self.wait_interval.min(deadline - now);
            state = match self.returned.wait_timeout(state, wait) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Takes an instance back. It is kept if an idle slot is free and its
    /// `unlock` succeeds, and dropped otherwise.
    pub fn retreat(&self, mut item: T) {
        if !item.unlock() {
            tracing::debug!(target: "katcodec::pool", "dropping instance that was not locked");
            return;
        }
        let mut state = self.state();
        if state.idle.len() < self.size {
            state.idle.push(item);
            drop(state);
            self.returned.notify_one();
        }
    }

    /// Borrows an instance that is retreated when the lease drops.
    pub fn lease(&self) -> Lease<'_, T> {
        Lease {
            pool: self,
            item: Some(self.borrow()),
        }
    }

    /// Drops all idle instances and forgets how many were created.
    pub fn close(&self) {
        let mut state = self.state();
        let dropped = state.idle.len();
        state.idle.clear();
        state.grown = 0;
        drop(state);
        self.returned.notify_all();
        tracing::debug!(target: "katcodec::pool", dropped, "closed pool");
    }

    #[must_use]
    pub fn idle(&self) -> usize {
        self.state().idle.len()
    }

    /// Instances created under the size ceiling.
    #[must_use]
    pub fn grown(&self) -> usize {
        self.state().grown
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("size", &self.size)
            .field("blocking", &self.blocking)
            .field("wait_interval", &self.wait_interval)
            .field("borrow_timeout", &self.borrow_timeout)
            .finish_non_exhaustive()
    }
}

/// Borrowed instance, retreated to its pool on drop.
pub struct Lease<'a, T: Poolable> {
    pool: &'a ObjectPool<T>,
    item: Option<T>,
}

impl<T: Poolable> Deref for Lease<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only `Drop` empties the slot.
        self.item.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Poolable> DerefMut for Lease<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T: Poolable> Drop for Lease<'_, T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.retreat(item);
        }
    }
}
