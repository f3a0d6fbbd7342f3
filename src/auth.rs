//! Proxy authentication headers

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::{Mutex, RwLock};
use std::time::{Duration, Instant};

const BASIC_AUTH_PREFIX: &str = "Basic ";

/// Produces the value of a `Proxy-Authorization` header
pub trait AuthProvider: Send + Sync {
    fn credentials(&self) -> String;
}

impl<F> AuthProvider for F
where
    F: Fn() -> String + Send + Sync,
{
    fn credentials(&self) -> String {
        self()
    }
}

/// Source of proxy username and password
pub trait ProxyCredentialsProvider: Send + Sync {
    fn proxy_credentials(&self) -> (Vec<u8>, Vec<u8>);
}

/// `Basic <base64(user:pass)>`, allocated at its exact final size
///
/// ```
/// use wirepool::basic_auth_header;
///
/// assert_eq!(basic_auth_header(b"user", b"pass"), "Basic dXNlcjpwYXNz");
/// ```
pub fn basic_auth_header(username: &[u8], password: &[u8]) -> String {
    let cred_len = username.len() + password.len() + 1;
    let total_len = BASIC_AUTH_PREFIX.len() + cred_len.div_ceil(3) * 4;

    let mut creds = Vec::with_capacity(cred_len);
    creds.extend_from_slice(username);
    creds.push(b':');
    creds.extend_from_slice(password);

    let mut header = String::with_capacity(total_len);
    header.push_str(BASIC_AUTH_PREFIX);
    STANDARD.encode_string(&creds, &mut header);
    debug_assert_eq!(header.len(), total_len);
    header
}

pub fn basic_auth_header_str(username: &str, password: &str) -> String {
    basic_auth_header(username.as_bytes(), password.as_bytes())
}

/// Builds a fresh Basic header on every call
pub struct SimpleAuth<P> {
    provider: P,
}

impl<P: ProxyCredentialsProvider> SimpleAuth<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: ProxyCredentialsProvider> AuthProvider for SimpleAuth<P> {
    fn credentials(&self) -> String {
        let (user, pass) = self.provider.proxy_credentials();
        basic_auth_header(&user, &pass)
    }
}

struct CachedHeader {
    refreshed_at: Instant,
    header: String,
}

/// Basic header cached for a fixed duration
///
/// Once the cache is older than the duration, the first caller to win a
/// non-blocking lock refreshes it. Callers that lose the race get the stale
/// header instead of waiting. Only the very first call, when nothing is
/// cached yet, waits for the provider.
pub struct CachedAuth<P> {
    provider: P,
    ttl: Duration,
    cached: RwLock<Option<CachedHeader>>,
    refresh: Mutex<()>,
}

impl<P: ProxyCredentialsProvider> CachedAuth<P> {
    pub fn new(provider: P, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    fn fresh(&self) -> Option<String> {
        self.cached
            .read()
            .as_ref()
            .filter(|c| c.refreshed_at.elapsed() <= self.ttl)
            .map(|c| c.header.clone())
    }

    fn stale(&self) -> Option<String> {
        self.cached.read().as_ref().map(|c| c.header.clone())
    }
}

impl<P: ProxyCredentialsProvider> AuthProvider for CachedAuth<P> {
    fn credentials(&self) -> String {
        if let Some(header) = self.fresh() {
            return header;
        }

        let _guard = match self.refresh.try_lock() {
            Some(guard) => guard,
            None => match self.stale() {
                Some(header) => return header,
                None => self.refresh.lock(),
            },
        };

        // Another caller may have refreshed while we waited.
        if let Some(header) = self.fresh() {
            return header;
        }

        let (user, pass) = self.provider.proxy_credentials();
        let header = basic_auth_header(&user, &pass);
        *self.cached.write() = Some(CachedHeader {
            refreshed_at: Instant::now(),
            header: header.clone(),
        });
        header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct CountingCreds {
        calls: Arc<AtomicUsize>,
    }

    impl ProxyCredentialsProvider for CountingCreds {
        fn proxy_credentials(&self) -> (Vec<u8>, Vec<u8>) {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            (b"user".to_vec(), format!("pass{n}").into_bytes())
        }
    }

    fn counting() -> (CountingCreds, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (CountingCreds { calls: Arc::clone(&calls) }, calls)
    }

    #[test]
    fn test_basic_auth_decodes_back() {
        for (user, pass) in [("user", "pass"), ("", ""), ("a", "bc"), ("proxy-user", "s3cr3t:x")] {
            let header = basic_auth_header_str(user, pass);
            let encoded = header.strip_prefix("Basic ").unwrap();
            let decoded = STANDARD.decode(encoded).unwrap();
            assert_eq!(decoded, format!("{user}:{pass}").into_bytes());
        }
    }

    #[test]
    fn test_basic_auth_exact_length() {
        let header = basic_auth_header(b"ab", b"cd");
        assert_eq!(header.len(), 6 + 8);
        assert_eq!(header, "Basic YWI6Y2Q=");
    }

    #[test]
    fn test_simple_auth_calls_every_time() {
        let (creds, calls) = counting();
        let auth = SimpleAuth::new(creds);
        auth.credentials();
        auth.credentials();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cached_auth_reuses_within_ttl() {
        let (creds, calls) = counting();
        let auth = CachedAuth::new(creds, Duration::from_secs(3600));

        let first = auth.credentials();
        let second = auth.credentials();

        assert_eq!(first, second);
        assert_eq!(first, basic_auth_header(b"user", b"pass0"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cached_auth_refreshes_after_ttl() {
        let (creds, calls) = counting();
        let auth = CachedAuth::new(creds, Duration::from_millis(5));

        auth.credentials();
        thread::sleep(Duration::from_millis(20));
        let refreshed = auth.credentials();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed, basic_auth_header(b"user", b"pass1"));
    }

    #[test]
    fn test_cached_auth_serves_stale_under_contention() {
        let (creds, calls) = counting();
        let auth = CachedAuth::new(creds, Duration::from_millis(5));
        let first = auth.credentials();
        thread::sleep(Duration::from_millis(20));

        let _held = auth.refresh.lock();
        assert_eq!(auth.credentials(), first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
