//! # wirepool
//!
//! Bounded object pools and the HTTP/CONNECT proxy plumbing built on them.
//!
//! ## Features
//!
//! - `LimitedPool`: thread-safe free-list that never retains more than `N` entries
//! - `LruLimitedPool`: the same, drained by a background sweeper once idle
//! - `RecyclerBufferPool`: LIFO byte-buffer recycler behind a coordinator thread
//! - `WorkerPool`: fixed worker threads with two-step close/stop shutdown
//! - Wire builders for CONNECT requests, status lines and forwarded requests
//! - Proxy `Basic` auth with optional time-based caching
//! - Body copy that flushes the source after every chunk
//! - Key/value store abstraction with FNV-1a hashed keys
//! - Metrics snapshots and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use wirepool::{connect_request_bytes, is_http_ok, LimitedPool};
//!
//! let pool = LimitedPool::new(16, || Vec::<u8>::with_capacity(512));
//! {
//!     let mut buf = pool.get_pooled();
//!     buf.extend_from_slice(&connect_request_bytes("example.com:443", None));
//!     assert!(buf.starts_with(b"CONNECT example.com:443 HTTP/1.1\r\n"));
//!     // Buffer goes back to the pool when `buf` goes out of scope
//! }
//!
//! assert!(is_http_ok(b"HTTP/1.1 200 OK\r\n\r\n", true));
//! ```

mod auth;
mod cache;
mod config;
mod copy;
mod errors;
mod eviction;
mod lru;
mod metrics;
mod pool;
mod recycler;
mod request;
mod wire;
mod worker;

pub use auth::{
    AuthProvider, CachedAuth, ProxyCredentialsProvider, SimpleAuth, basic_auth_header,
    basic_auth_header_str,
};
pub use cache::{HashedStore, KeyValueStore, MemoryStore, cache_key};
pub use config::{
    DEFAULT_LIMITED_POOL_SIZE, DEFAULT_LRU_INTERVAL, DEFAULT_LRU_POOL_SIZE, DEFAULT_RECYCLE_AGE,
    PoolConfiguration, RecyclerConfiguration, WorkerPoolConfiguration,
};
pub use copy::{Flusher, NoFlush, copy_body, copy_body_async};
pub use errors::{PoolError, PoolResult, StoreError, StoreResult, WireError, WireResult};
pub use lru::LruLimitedPool;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{LimitedPool, PooledObject, Recycle};
pub use recycler::RecyclerBufferPool;
pub use request::{Body, BodyFactory, Headers, RawRequest, build_request_bytes, copy_headers};
pub use wire::{
    HOP_HEADERS, HeaderDeleter, connect_request_bytes, cookie_domain_valid, del_hop_headers,
    is_conn_closed, is_http_ok, is_http_ok_async, is_http_ok_reader, join_host_int_port,
    join_host_port, join_str_host_int_port, join_str_host_str_port, status_ok_bytes,
};
pub use worker::{Job, WorkerPool};
