// wirepool demo binary
// The library lives in lib.rs; this walks through the main pieces once.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wirepool::{
    CachedAuth, HashedStore, KeyValueStore, LimitedPool, LruLimitedPool, MemoryStore,
    ProxyCredentialsProvider, RawRequest, RecyclerBufferPool, WorkerPool, build_request_bytes,
    connect_request_bytes, is_http_ok_async,
};

struct StaticCreds;

impl ProxyCredentialsProvider for StaticCreds {
    fn proxy_credentials(&self) -> (Vec<u8>, Vec<u8>) {
        (b"user".to_vec(), b"pass".to_vec())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("wirepool v{}", env!("CARGO_PKG_VERSION"));

    // Bounded pool
    let pool = LimitedPool::new(4, || Vec::<u8>::with_capacity(256));
    {
        let mut buf = pool.get_pooled();
        buf.extend_from_slice(b"scratch");
    }
    info!(retained = pool.retained(), "limited pool after return");

    // CONNECT with cached Basic auth
    let auth = CachedAuth::new(StaticCreds, Duration::from_secs(30));
    let connect = connect_request_bytes("example.com:443", Some(&auth));
    info!(request = %String::from_utf8_lossy(&connect).escape_debug(), "CONNECT");

    let ok = is_http_ok_async(&mut &b"HTTP/1.1 200 OK\r\n\r\n"[..], true).await?;
    info!(ok, "proxy answered");

    // Forwarded request with hop-by-hop headers stripped
    let mut req = RawRequest::new("GET", "/index.html")
        .with_host("example.com")
        .with_header("Connection", "keep-alive")
        .with_header("Accept", "*/*");
    let wire = build_request_bytes(&mut req)?;
    info!(bytes = wire.len(), "forwarded request");

    // Idle eviction
    let evicted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&evicted);
    let lru = LruLimitedPool::with_destructor(
        2,
        Duration::from_millis(50),
        || vec![0u8; 64],
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
    );
    let (a, b) = (lru.get(), lru.get());
    lru.put(a);
    lru.put(b);
    tokio::time::sleep(Duration::from_millis(120)).await;
    info!(
        retained = lru.retained(),
        evicted = evicted.load(Ordering::SeqCst),
        "lru pool after idle interval"
    );
    lru.close()?;

    // Buffer recycler
    let recycler = RecyclerBufferPool::new(4096);
    let buf = recycler.get();
    recycler.put(buf);
    recycler.close()?;

    // Worker pool
    let workers = WorkerPool::new(4);
    let done = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let done = Arc::clone(&done);
        workers.submit(move || {
            done.fetch_add(1, Ordering::SeqCst);
        });
    }
    workers.close();
    workers.stop();
    info!(executed = done.load(Ordering::SeqCst), "worker pool drained");

    // Response cache
    let cache = HashedStore::new(MemoryStore::new());
    cache.put(b"GET example.com/index.html", b"<html></html>")?;
    info!(entries = cache.len(), "cache populated");
    cache.close()?;

    Ok(())
}
