//! Age tracking used by the evicting pools

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Time of the most recent retained `put`, behind its own lock.
///
/// "LRU" for [`LruLimitedPool`](crate::LruLimitedPool) means time since the last
/// put into the pool as a whole, not per-entry recency.
#[derive(Debug, Default)]
pub(crate) struct IdleClock {
    last_put: Mutex<Option<Instant>>,
}

impl IdleClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&self) {
        *self.last_put.lock() = Some(Instant::now());
    }

    /// Clears the clock and returns true if the last put is older than `idle`.
    /// An untouched clock never expires.
    pub fn take_if_idle(&self, idle: Duration) -> bool {
        let mut last_put = self.last_put.lock();
        match *last_put {
            Some(at) if at.elapsed() > idle => {
                *last_put = None;
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn is_set(&self) -> bool {
        self.last_put.lock().is_some()
    }
}

/// A value with the instant it was deposited
#[derive(Debug)]
pub(crate) struct Stamped<T> {
    pub when: Instant,
    pub value: T,
}

impl<T> Stamped<T> {
    pub fn now(value: T) -> Self {
        Self {
            when: Instant::now(),
            value,
        }
    }

    pub fn is_older_than(&self, age: Duration) -> bool {
        self.when.elapsed() > age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_untouched_clock_never_idle() {
        let clock = IdleClock::new();
        assert!(!clock.take_if_idle(Duration::ZERO));
    }

    #[test]
    fn test_take_if_idle_clears() {
        let clock = IdleClock::new();
        clock.touch();
        thread::sleep(Duration::from_millis(5));

        assert!(clock.take_if_idle(Duration::from_millis(1)));
        assert!(!clock.is_set());
        assert!(!clock.take_if_idle(Duration::from_millis(1)));
    }

    #[test]
    fn test_stamped_age() {
        let stamped = Stamped::now(vec![0u8; 4]);
        assert!(!stamped.is_older_than(Duration::from_secs(60)));
        thread::sleep(Duration::from_millis(5));
        assert!(stamped.is_older_than(Duration::from_millis(1)));
    }
}
