//! Pool configuration options

use std::time::Duration;

/// Default cap on idle entries kept by a [`LimitedPool`](crate::LimitedPool).
pub const DEFAULT_LIMITED_POOL_SIZE: usize = 1 << 7;

/// Default cap on idle entries kept by an [`LruLimitedPool`](crate::LruLimitedPool).
pub const DEFAULT_LRU_POOL_SIZE: usize = 1 << 7;

/// Default sweep interval for an [`LruLimitedPool`](crate::LruLimitedPool).
pub const DEFAULT_LRU_INTERVAL: Duration = Duration::from_secs(10);

/// Age after which recycled buffers are released.
pub const DEFAULT_RECYCLE_AGE: Duration = Duration::from_secs(60);

/// Configuration for bounded pools
///
/// # Examples
///
/// ```
/// use wirepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_max_retained(64)
///     .with_eviction_interval(Duration::from_secs(30));
///
/// assert_eq!(config.max_retained, 64);
/// assert_eq!(config.eviction_interval, Some(Duration::from_secs(30)));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfiguration {
    /// Maximum number of idle entries kept on the free-list
    pub max_retained: usize,

    /// How often idle entries are swept. `None` disables the sweeper.
    pub eviction_interval: Option<Duration>,

    /// Name given to the sweeper thread
    pub name: String,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            max_retained: DEFAULT_LIMITED_POOL_SIZE,
            eviction_interval: Some(DEFAULT_LRU_INTERVAL),
            name: "wirepool".to_string(),
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cap on retained entries
    pub fn with_max_retained(mut self, n: usize) -> Self {
        self.max_retained = n;
        self
    }

    /// Set the sweep interval. A zero interval disables sweeping.
    pub fn with_eviction_interval(mut self, interval: Duration) -> Self {
        self.eviction_interval = if interval.is_zero() { None } else { Some(interval) };
        self
    }

    /// Disable the background sweeper
    pub fn without_eviction(mut self) -> Self {
        self.eviction_interval = None;
        self
    }

    /// Set the pool name used for thread names and metric labels
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Configuration for a [`RecyclerBufferPool`](crate::RecyclerBufferPool)
///
/// # Examples
///
/// ```
/// use wirepool::RecyclerConfiguration;
/// use std::time::Duration;
///
/// let config = RecyclerConfiguration::new(4096)
///     .with_max_age(Duration::from_secs(5));
///
/// assert_eq!(config.buffer_len, 4096);
/// assert_eq!(config.idle_tick, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecyclerConfiguration {
    /// Length of every buffer handed out
    pub buffer_len: usize,

    /// Buffers deposited longer ago than this are released
    pub max_age: Duration,

    /// How long the coordinator waits idle before sweeping old buffers
    pub idle_tick: Duration,
}

impl RecyclerConfiguration {
    pub fn new(buffer_len: usize) -> Self {
        Self {
            buffer_len,
            max_age: DEFAULT_RECYCLE_AGE,
            idle_tick: DEFAULT_RECYCLE_AGE,
        }
    }

    /// Set the maximum buffer age. The idle tick follows it.
    pub fn with_max_age(mut self, age: Duration) -> Self {
        self.max_age = age;
        self.idle_tick = age;
        self
    }

    pub fn with_idle_tick(mut self, tick: Duration) -> Self {
        self.idle_tick = tick;
        self
    }
}

/// Configuration for a [`WorkerPool`](crate::WorkerPool)
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WorkerPoolConfiguration {
    /// Number of worker threads; also the job queue capacity
    pub workers: usize,

    /// Prefix for worker thread names
    pub thread_name: String,
}

impl WorkerPoolConfiguration {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            thread_name: "wirepool-worker".to_string(),
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
