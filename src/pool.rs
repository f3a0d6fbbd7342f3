//! Bounded free-list pool

use crate::config::PoolConfiguration;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};

use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Anything a [`PooledObject`] can hand its value back to.
pub trait Recycle<T>: Sync {
    /// Return a value. The pool may keep or drop it.
    fn recycle(&self, value: T);
}

/// A pooled value that goes back to its pool when dropped
pub struct PooledObject<'a, T> {
    value: Option<T>,
    pool: &'a dyn Recycle<T>,
}

impl<'a, T> PooledObject<'a, T> {
    pub(crate) fn new(value: T, pool: &'a dyn Recycle<T>) -> Self {
        Self {
            value: Some(value),
            pool,
        }
    }

    /// Take the value out without returning it to the pool
    pub fn into_inner(mut self) -> T {
        self.value.take().expect("value already taken")
    }
}

impl<T> Deref for PooledObject<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("value already taken")
    }
}

impl<T> DerefMut for PooledObject<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("value already taken")
    }
}

impl<T> Drop for PooledObject<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.recycle(value);
        }
    }
}

pub(crate) type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// Storage shared by [`LimitedPool`] and [`LruLimitedPool`](crate::LruLimitedPool).
///
/// `retained` mirrors `entries.len()` and is only written with `entries` locked,
/// so it can be read without taking the lock.
pub(crate) struct FreeList<T> {
    entries: Mutex<Vec<T>>,
    retained: AtomicUsize,
    max_retained: usize,
    factory: Factory<T>,
    pub(crate) metrics: MetricsTracker,
}

impl<T> FreeList<T> {
    pub fn new(max_retained: usize, factory: Factory<T>) -> Self {
        Self {
            entries: Mutex::new(Vec::with_capacity(max_retained.min(64))),
            retained: AtomicUsize::new(0),
            max_retained,
            factory,
            metrics: MetricsTracker::new(),
        }
    }

    pub fn get(&self) -> T {
        let popped = {
            let mut entries = self.entries.lock();
            let value = entries.pop();
            if value.is_some() {
                self.retained.fetch_sub(1, Ordering::Release);
            }
            value
        };

        match popped {
            Some(value) => {
                self.metrics.record_hit();
                value
            }
            None => {
                self.metrics.record_miss();
                (self.factory)()
            }
        }
    }

    /// Returns true if the value was retained.
    pub fn put(&self, value: T) -> bool {
        let mut entries = self.entries.lock();
        if self.retained.load(Ordering::Acquire) < self.max_retained {
            entries.push(value);
            self.retained.fetch_add(1, Ordering::Release);
            self.metrics.record_return();
            true
        } else {
            drop(entries);
            self.metrics.record_drop();
            false
        }
    }

    /// Empty the free-list and reset the retained count.
    pub fn drain(&self) -> Vec<T> {
        let mut entries = self.entries.lock();
        self.retained.store(0, Ordering::Release);
        std::mem::take(&mut *entries)
    }

    pub fn retained(&self) -> usize {
        self.retained.load(Ordering::Acquire)
    }

    pub fn max_retained(&self) -> usize {
        self.max_retained
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(self.retained(), self.max_retained)
    }
}

/// Thread-safe pool that keeps at most `N` idle entries
///
/// `get` never fails: an empty pool calls the factory. `put` beyond the cap
/// drops the value, so retained memory stays linear in `N` no matter how many
/// entries are in flight at peak.
///
/// # Examples
///
/// ```
/// use wirepool::LimitedPool;
///
/// let pool = LimitedPool::new(2, || Vec::<u8>::with_capacity(256));
///
/// {
///     let mut buf = pool.get_pooled();
///     buf.extend_from_slice(b"hello");
/// }
///
/// assert_eq!(pool.retained(), 1);
/// ```
pub struct LimitedPool<T> {
    inner: FreeList<T>,
}

impl<T> LimitedPool<T> {
    /// Create a pool retaining at most `n` idle entries
    pub fn new<F>(n: usize, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: FreeList::new(n, Box::new(factory)),
        }
    }

    /// Create a pool from a configuration. Only `max_retained` applies here.
    pub fn with_config<F>(config: &PoolConfiguration, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::new(config.max_retained, factory)
    }

    /// Take an entry, creating one if the pool is empty
    pub fn get(&self) -> T {
        self.inner.get()
    }

    /// Return an entry. Dropped if the pool already retains `N` entries.
    pub fn put(&self, value: T) {
        self.inner.put(value);
    }

    /// Number of idle entries currently retained
    pub fn retained(&self) -> usize {
        self.inner.retained()
    }

    /// Cap on retained entries
    pub fn capacity(&self) -> usize {
        self.inner.max_retained()
    }

    pub fn is_empty(&self) -> bool {
        self.retained() == 0
    }

    /// Get pool metrics
    pub fn metrics(&self) -> PoolMetrics {
        self.inner.metrics()
    }

    /// Export metrics in Prometheus format
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }
}

impl<T: Send> LimitedPool<T> {
    /// Take an entry that returns itself when dropped
    pub fn get_pooled(&self) -> PooledObject<'_, T> {
        PooledObject::new(self.get(), self)
    }
}

impl<T: Send> Recycle<T> for LimitedPool<T> {
    fn recycle(&self, value: T) {
        self.put(value);
    }
}
