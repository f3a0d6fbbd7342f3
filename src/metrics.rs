//! Metrics collection and export for pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Snapshot of a pool's counters
///
/// # Examples
///
/// ```
/// use wirepool::LimitedPool;
///
/// let pool = LimitedPool::new(4, || vec![0u8; 16]);
/// let buf = pool.get();
/// pool.put(buf);
///
/// let metrics = pool.metrics();
/// assert_eq!(metrics.misses, 1);
/// assert_eq!(metrics.returns, 1);
/// assert_eq!(metrics.retained, 1);
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolMetrics {
    /// Gets served from the free-list
    pub hits: usize,

    /// Gets that had to call the factory
    pub misses: usize,

    /// Puts that were retained
    pub returns: usize,

    /// Puts dropped because the pool was at its cap
    pub drops: usize,

    /// Entries released by eviction
    pub evictions: usize,

    /// Entries currently retained
    pub retained: usize,

    /// Cap on retained entries
    pub max_retained: usize,

    /// retained / max_retained (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Fraction of gets served without calling the factory
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("hits".to_string(), self.hits.to_string());
        metrics.insert("misses".to_string(), self.misses.to_string());
        metrics.insert("returns".to_string(), self.returns.to_string());
        metrics.insert("drops".to_string(), self.drops.to_string());
        metrics.insert("evictions".to_string(), self.evictions.to_string());
        metrics.insert("retained".to_string(), self.retained.to_string());
        metrics.insert("max_retained".to_string(), self.max_retained.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use wirepool::{LimitedPool, MetricsExporter};
    /// use std::collections::HashMap;
    ///
    /// let pool = LimitedPool::new(4, || 0u32);
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "proxy".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.metrics(), "conn_bufs", Some(&tags));
    /// assert!(output.contains("wirepool_entries_retained"));
    /// assert!(output.contains("service=\"proxy\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        output.push_str("# HELP wirepool_entries_retained Idle entries on the free-list\n");
        output.push_str("# TYPE wirepool_entries_retained gauge\n");
        output.push_str(&format!("wirepool_entries_retained{{{}}} {}\n", labels, metrics.retained));

        output.push_str("# HELP wirepool_utilization Retained entries over cap\n");
        output.push_str("# TYPE wirepool_utilization gauge\n");
        output.push_str(&format!("wirepool_utilization{{{}}} {:.2}\n", labels, metrics.utilization));

        output.push_str("# HELP wirepool_hits_total Gets served from the free-list\n");
        output.push_str("# TYPE wirepool_hits_total counter\n");
        output.push_str(&format!("wirepool_hits_total{{{}}} {}\n", labels, metrics.hits));

        output.push_str("# HELP wirepool_misses_total Gets that called the factory\n");
        output.push_str("# TYPE wirepool_misses_total counter\n");
        output.push_str(&format!("wirepool_misses_total{{{}}} {}\n", labels, metrics.misses));

        output.push_str("# HELP wirepool_returns_total Entries returned and retained\n");
        output.push_str("# TYPE wirepool_returns_total counter\n");
        output.push_str(&format!("wirepool_returns_total{{{}}} {}\n", labels, metrics.returns));

        output.push_str("# HELP wirepool_drops_total Entries dropped at the cap\n");
        output.push_str("# TYPE wirepool_drops_total counter\n");
        output.push_str(&format!("wirepool_drops_total{{{}}} {}\n", labels, metrics.drops));

        output.push_str("# HELP wirepool_evictions_total Entries released by the sweeper\n");
        output.push_str("# TYPE wirepool_evictions_total counter\n");
        output.push_str(&format!("wirepool_evictions_total{{{}}} {}\n", labels, metrics.evictions));

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub hits: AtomicUsize,
    pub misses: AtomicUsize,
    pub returns: AtomicUsize,
    pub drops: AtomicUsize,
    pub evictions: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_return(&self) {
        self.returns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, n: usize) {
        self.evictions.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, retained: usize, max_retained: usize) -> PoolMetrics {
        let utilization = if max_retained > 0 {
            retained as f64 / max_retained as f64
        } else {
            0.0
        };

        PoolMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            retained,
            max_retained,
            utilization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let tracker = MetricsTracker::new();
        tracker.record_miss();
        tracker.record_hit();
        tracker.record_hit();
        tracker.record_hit();

        let metrics = tracker.get_metrics(1, 4);
        assert_eq!(metrics.hit_rate(), 0.75);
        assert_eq!(metrics.utilization, 0.25);
        assert_eq!(metrics.export()["hits"], "3");
    }

    #[test]
    fn test_prometheus_labels_sorted() {
        let metrics = MetricsTracker::new().get_metrics(0, 0);
        let mut tags = HashMap::new();
        tags.insert("b".to_string(), "2".to_string());
        tags.insert("a".to_string(), "1".to_string());

        let output = MetricsExporter::export_prometheus(&metrics, "p", Some(&tags));
        assert!(output.contains("wirepool_drops_total{pool=\"p\",a=\"1\",b=\"2\"} 0"));
    }
}
