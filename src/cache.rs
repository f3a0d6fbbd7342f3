//! Key/value store collaborator with hashed keys

use crate::errors::{StoreError, StoreResult};

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Byte-keyed store used as a response cache.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>>;

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> StoreResult<()>;

    fn has(&self, key: &[u8]) -> bool;

    fn delete(&self, key: &[u8]) -> StoreResult<()>;

    fn delete_all(&self) -> StoreResult<()>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn close(&self) -> StoreResult<()>;

    /// Reclaim space held by expired or deleted entries
    fn run_gc(&self) -> StoreResult<()>;
}

/// FNV-1a 64 of `key`, little-endian, with zero high-order bytes trimmed.
///
/// At least one byte is always kept.
///
/// ```
/// use wirepool::cache_key;
///
/// assert_eq!(cache_key(b"a"), 0xaf63dc4c8601ec8cu64.to_le_bytes());
/// ```
pub fn cache_key(key: &[u8]) -> Vec<u8> {
    let hash = key.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    });

    let bytes = hash.to_le_bytes();
    let len = bytes.iter().rposition(|&b| b != 0).map_or(1, |i| i + 1);
    bytes[..len].to_vec()
}

/// Wraps a store so every key passes through [`cache_key`] first
pub struct HashedStore<S> {
    inner: S,
}

impl<S: KeyValueStore> HashedStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn get_str(&self, key: &str) -> StoreResult<Vec<u8>> {
        self.get(key.as_bytes())
    }

    pub fn put_str(&self, key: &str, value: &str) -> StoreResult<()> {
        self.put(key.as_bytes(), value.as_bytes())
    }
}

impl<S: KeyValueStore> KeyValueStore for HashedStore<S> {
    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.inner.get(&cache_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.inner.put(&cache_key(key), value)
    }

    fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.inner.put_with_ttl(&cache_key(key), value, ttl)
    }

    fn has(&self, key: &[u8]) -> bool {
        self.inner.has(&cache_key(key))
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.inner.delete(&cache_key(key))
    }

    fn delete_all(&self) -> StoreResult<()> {
        self.inner.delete_all()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn run_gc(&self) -> StoreResult<()> {
        self.inner.run_gc()
    }
}

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process store backed by a `DashMap`.
///
/// Expired entries are invisible to reads and are removed lazily on `get` or
/// in bulk by `run_gc`.
///
/// # Examples
///
/// ```
/// use wirepool::{HashedStore, KeyValueStore, MemoryStore};
///
/// let store = HashedStore::new(MemoryStore::new());
/// store.put(b"GET /index.html", b"<html>").unwrap();
/// assert_eq!(store.get(b"GET /index.html").unwrap(), b"<html>");
/// ```
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<Vec<u8>, Entry>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn insert(&self, key: &[u8], value: &[u8], expires_at: Option<Instant>) -> StoreResult<()> {
        self.ensure_open()?;
        self.entries.insert(
            key.to_vec(),
            Entry {
                value: value.to_vec(),
                expires_at,
            },
        );
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Vec<u8>> {
        self.ensure_open()?;
        let now = Instant::now();

        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(entry.value.clone()),
            Some(_) => {}
            None => return Err(StoreError::NotFound),
        }

        // The read guard is released above; removing while holding it would deadlock the shard.
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        Err(StoreError::NotFound)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.insert(key, value, None)
    }

    fn put_with_ttl(&self, key: &[u8], value: &[u8], ttl: Duration) -> StoreResult<()> {
        self.insert(key, value, Some(Instant::now() + ttl))
    }

    fn has(&self, key: &[u8]) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let now = Instant::now();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.ensure_open()?;
        self.entries.remove(key);
        Ok(())
    }

    fn delete_all(&self) -> StoreResult<()> {
        self.ensure_open()?;
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    fn close(&self) -> StoreResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Closed);
        }
        self.entries.clear();
        Ok(())
    }

    fn run_gc(&self) -> StoreResult<()> {
        self.ensure_open()?;
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged, "store gc removed expired entries");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_cache_key_known_vectors() {
        assert_eq!(cache_key(b""), FNV_OFFSET_BASIS.to_le_bytes());
        assert_eq!(cache_key(b"a"), 0xaf63_dc4c_8601_ec8cu64.to_le_bytes());
        assert_eq!(cache_key(b"foobar"), 0x8594_4171_f739_67e8u64.to_le_bytes());
    }

    #[test]
    fn test_cache_key_is_deterministic() {
        assert_eq!(cache_key(b"GET /a"), cache_key(b"GET /a"));
        assert_ne!(cache_key(b"GET /a"), cache_key(b"GET /b"));
        assert!(!cache_key(b"anything").is_empty());
        assert!(cache_key(b"anything").len() <= 8);
    }

    #[test]
    fn test_memory_store_put_get_delete() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();

        assert!(store.has(b"k"));
        assert_eq!(store.get(b"k").unwrap(), b"v");
        assert_eq!(store.len(), 1);

        store.delete(b"k").unwrap();
        assert!(!store.has(b"k"));
        assert!(matches!(store.get(b"k"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_memory_store_ttl_expiry() {
        let store = MemoryStore::new();
        store.put_with_ttl(b"short", b"v", Duration::from_millis(10)).unwrap();
        store.put(b"long", b"v").unwrap();

        thread::sleep(Duration::from_millis(30));

        assert!(!store.has(b"short"));
        assert_eq!(store.len(), 1);
        assert!(matches!(store.get(b"short"), Err(StoreError::NotFound)));
        assert_eq!(store.entries.len(), 1);
    }

    #[test]
    fn test_memory_store_gc_purges_expired() {
        let store = MemoryStore::new();
        for i in 0..5u8 {
            store.put_with_ttl(&[i], b"v", Duration::from_millis(5)).unwrap();
        }
        store.put(b"keep", b"v").unwrap();
        thread::sleep(Duration::from_millis(20));

        store.run_gc().unwrap();
        assert_eq!(store.entries.len(), 1);
    }

    #[test]
    fn test_memory_store_delete_all() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        store.put(b"b", b"2").unwrap();
        store.delete_all().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_store_close() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        store.close().unwrap();

        assert!(matches!(store.put(b"a", b"1"), Err(StoreError::Closed)));
        assert!(matches!(store.get(b"a"), Err(StoreError::Closed)));
        assert!(matches!(store.close(), Err(StoreError::Closed)));
        assert!(!store.has(b"a"));
    }

    #[test]
    fn test_hashed_store_hashes_every_key() {
        let store = HashedStore::new(MemoryStore::new());
        store.put_str("GET /", "body").unwrap();

        assert!(store.inner().has(&cache_key(b"GET /")));
        assert!(!store.inner().has(b"GET /"));
        assert_eq!(store.get_str("GET /").unwrap(), b"body");

        store.delete(b"GET /").unwrap();
        assert!(!store.has(b"GET /"));
        assert!(store.inner().is_empty());
    }

    #[test]
    fn test_memory_store_concurrent_writers() {
        let store = Arc::new(MemoryStore::new());
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for i in 0..100u8 {
                        store.put(&[t, i], &[i]).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
