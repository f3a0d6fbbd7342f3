//! Bounded pool that empties itself after a quiet interval

use crate::config::{PoolConfiguration, DEFAULT_LRU_POOL_SIZE};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::IdleClock;
use crate::metrics::{MetricsExporter, PoolMetrics};
use crate::pool::{FreeList, PooledObject, Recycle};

use bytes::BytesMut;
use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

type Destructor<T> = Box<dyn Fn(T) + Send + Sync>;

struct Shared<T> {
    list: FreeList<T>,
    clock: IdleClock,
    interval: Option<Duration>,
    destructor: Option<Destructor<T>>,
    name: String,
}

impl<T> Shared<T> {
    fn put(&self, value: T) {
        if self.list.put(value) {
            self.clock.touch();
        }
    }

    fn cleanup(&self) -> usize {
        let drained = self.list.drain();
        let count = drained.len();
        match &self.destructor {
            Some(destroy) => drained.into_iter().for_each(|value| destroy(value)),
            None => drop(drained),
        }
        if count > 0 {
            self.list.metrics.record_evictions(count);
            debug!(pool = %self.name, evicted = count, "released idle pool entries");
        }
        count
    }

    fn sweep(&self) {
        if let Some(interval) = self.interval
            && self.clock.take_if_idle(interval)
        {
            self.cleanup();
        }
    }
}

struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// [`LimitedPool`](crate::LimitedPool) with idle eviction
///
/// Every `interval` a sweeper thread checks when the pool last accepted a
/// `put`. If that was more than one interval ago, the whole free-list is
/// drained and the destructor (if any) runs once per entry.
///
/// The sweeper is stopped and joined by [`close`](Self::close) or on drop.
///
/// # Examples
///
/// ```
/// use wirepool::LruLimitedPool;
/// use std::time::Duration;
///
/// let pool = LruLimitedPool::buffer_pool(16, 512, Duration::from_secs(60));
/// let mut buf = pool.get();
/// assert_eq!(buf.len(), 0);
/// assert!(buf.capacity() >= 512);
///
/// buf.extend_from_slice(b"CONNECT");
/// buf.clear();
/// pool.put(buf);
/// assert_eq!(pool.retained(), 1);
/// ```
pub struct LruLimitedPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<T: Send + 'static> LruLimitedPool<T> {
    /// Create a pool retaining at most `n` entries, swept every `interval`
    pub fn new<F>(n: usize, interval: Duration, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        let config = PoolConfiguration::new()
            .with_max_retained(n)
            .with_eviction_interval(interval);
        Self::build(&config, Box::new(factory), None)
    }

    /// Like [`new`](Self::new), calling `destructor` on every evicted entry
    pub fn with_destructor<F, D>(n: usize, interval: Duration, factory: F, destructor: D) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        D: Fn(T) + Send + Sync + 'static,
    {
        let config = PoolConfiguration::new()
            .with_max_retained(n)
            .with_eviction_interval(interval);
        Self::build(&config, Box::new(factory), Some(Box::new(destructor)))
    }

    /// Create a pool from a configuration
    pub fn with_config<F>(config: &PoolConfiguration, factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(config, Box::new(factory), None)
    }

    fn build(
        config: &PoolConfiguration,
        factory: Box<dyn Fn() -> T + Send + Sync>,
        destructor: Option<Destructor<T>>,
    ) -> Self {
        let shared = Arc::new(Shared {
            list: FreeList::new(config.max_retained, factory),
            clock: IdleClock::new(),
            interval: config.eviction_interval,
            destructor,
            name: config.name.clone(),
        });

        let sweeper = config
            .eviction_interval
            .and_then(|interval| Self::spawn_sweeper(&shared, interval));

        Self {
            shared,
            sweeper: Mutex::new(sweeper),
        }
    }

    fn spawn_sweeper(shared: &Arc<Shared<T>>, interval: Duration) -> Option<Sweeper> {
        let (stop, stopped) = channel::bounded::<()>(0);
        let shared = Arc::clone(shared);
        let name = format!("{}-sweeper", shared.name);

        let spawned = thread::Builder::new().name(name).spawn(move || {
            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => shared.sweep(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        match spawned {
            Ok(handle) => Some(Sweeper { stop, handle }),
            Err(err) => {
                error!(error = %err, "failed to spawn pool sweeper, idle eviction disabled");
                None
            }
        }
    }

    /// Take an entry, creating one if the pool is empty
    pub fn get(&self) -> T {
        self.shared.list.get()
    }

    /// Return an entry and record the time of the put
    pub fn put(&self, value: T) {
        self.shared.put(value);
    }

    /// Take an entry that returns itself when dropped
    pub fn get_pooled(&self) -> PooledObject<'_, T> {
        PooledObject::new(self.get(), self)
    }

    /// Drain every idle entry now. Returns how many were released.
    pub fn cleanup(&self) -> usize {
        self.shared.cleanup()
    }

    /// Stop and join the sweeper. Pooling keeps working without eviction.
    pub fn close(&self) -> PoolResult<()> {
        let Some(sweeper) = self.sweeper.lock().take() else {
            return Ok(());
        };
        drop(sweeper.stop);
        sweeper
            .handle
            .join()
            .map_err(|_| PoolError::ThreadPanicked(format!("{}-sweeper", self.shared.name)))
    }

    pub fn interval(&self) -> Option<Duration> {
        self.shared.interval
    }

    /// Number of idle entries currently retained
    pub fn retained(&self) -> usize {
        self.shared.list.retained()
    }

    /// Cap on retained entries
    pub fn capacity(&self) -> usize {
        self.shared.list.max_retained()
    }

    pub fn metrics(&self) -> PoolMetrics {
        self.shared.list.metrics()
    }

    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }
}

impl LruLimitedPool<BytesMut> {
    /// Pool of empty byte buffers with capacity `size`
    pub fn buffer_pool(n: usize, size: usize, interval: Duration) -> Self {
        Self::new(n, interval, move || BytesMut::with_capacity(size))
    }

    /// [`buffer_pool`](Self::buffer_pool) with the default cap
    pub fn default_buffer_pool(size: usize, interval: Duration) -> Self {
        Self::buffer_pool(DEFAULT_LRU_POOL_SIZE, size, interval)
    }
}

impl<T: Send + 'static> Recycle<T> for LruLimitedPool<T> {
    fn recycle(&self, value: T) {
        self.put(value);
    }
}

impl<T: Send + 'static> Drop for LruLimitedPool<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!(error = %err, "pool sweeper did not shut down cleanly");
        }
        self.shared.cleanup();
    }
}
