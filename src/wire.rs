//! HTTP/CONNECT proxy wire helpers
//!
//! Builders assemble requests in a buffer borrowed from a process-wide
//! [`LruLimitedPool`] and hand back an owned copy, so callers never see
//! pooled memory. Probes are prefix matches only; nothing here parses HTTP.

use crate::auth::AuthProvider;
use crate::lru::LruLimitedPool;
use crate::pool::PooledObject;

use bytes::BytesMut;
use std::io::{self, BufRead, Read};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

const HTTP10_OK: &[u8] = b"HTTP/1.0 200 OK\r\n";
const HTTP11_OK: &[u8] = b"HTTP/1.1 200 OK\r\n";
/// First bytes of an HTTP/2 SETTINGS frame
const HTTP2_OK: &[u8] = b"\x00\x00\x86\x04\x00\x00\x00";

const CONNECT_PREFIX: &[u8] = b"CONNECT ";
const HTTP_VERSION: &[u8] = b" HTTP/1.1\r\n";
pub(crate) const HOST_PREFIX: &[u8] = b"Host: ";
pub(crate) const HEADER_SEP: &[u8] = b": ";
const PROXY_AUTH_PREFIX: &[u8] = b"Proxy-Authorization: ";
pub(crate) const CRLF: &[u8] = b"\r\n";

const OK_START: &[u8] = b"HTTP/";
const OK_END: &[u8] = b" 200 OK\r\n\r\n";
const OK_STATUS_LEN: usize = OK_START.len() + 3 + OK_END.len();

/// Longest response line the streaming probe accepts
const MAX_LINE_LEN: usize = 1 << 9;

const WIRE_POOL_SIZE: usize = 1 << 10;
const WIRE_BUFFER_SIZE: usize = 1 << 7;
/// Buffers that grew past this are not kept for reuse
const WIRE_BUFFER_MAX_RETAIN: usize = 1 << 13;
const WIRE_POOL_INTERVAL: Duration = Duration::from_secs(60);

/// Hop-by-hop headers. These are removed when a request is forwarded.
pub const HOP_HEADERS: [&str; 8] = [
    "Connection",
    "Keep-Alive",
    "Proxy-Authenticate",
    "Proxy-Connection",
    "Te",
    "Trailers",
    "Transfer-Encoding",
    "Upgrade",
];

static WIRE_BUFFERS: OnceLock<LruLimitedPool<BytesMut>> = OnceLock::new();

/// Buffers shared by the wire builders. The sweeper lives until process exit.
pub(crate) fn wire_buffers() -> &'static LruLimitedPool<BytesMut> {
    WIRE_BUFFERS.get_or_init(|| {
        LruLimitedPool::buffer_pool(WIRE_POOL_SIZE, WIRE_BUFFER_SIZE, WIRE_POOL_INTERVAL)
    })
}

/// Borrow an empty wire buffer; it is cleared again before going back.
pub(crate) fn wire_buffer() -> WireBuffer {
    let mut buf = wire_buffers().get_pooled();
    buf.clear();
    WireBuffer { buf }
}

pub(crate) struct WireBuffer {
    buf: PooledObject<'static, BytesMut>,
}

impl std::ops::Deref for WireBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl std::ops::DerefMut for WireBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for WireBuffer {
    fn drop(&mut self) {
        reset_for_reuse(&mut self.buf);
    }
}

/// Empty `buf`, swapping in a default-sized buffer if it grew too large.
fn reset_for_reuse(buf: &mut BytesMut) {
    if buf.capacity() > WIRE_BUFFER_MAX_RETAIN {
        *buf = BytesMut::with_capacity(WIRE_BUFFER_SIZE);
    } else {
        buf.clear();
    }
}

/// Build a CONNECT request for `address`
///
/// ```
/// use wirepool::connect_request_bytes;
///
/// let req = connect_request_bytes("example.com:443", None);
/// assert_eq!(req, b"CONNECT example.com:443 HTTP/1.1\r\nHost: example.com:443\r\n\r\n");
/// ```
pub fn connect_request_bytes(address: &str, proxy_auth: Option<&dyn AuthProvider>) -> Vec<u8> {
    let mut buf = wire_buffer();

    buf.extend_from_slice(CONNECT_PREFIX);
    buf.extend_from_slice(address.as_bytes());
    buf.extend_from_slice(HTTP_VERSION);
    buf.extend_from_slice(HOST_PREFIX);
    buf.extend_from_slice(address.as_bytes());
    buf.extend_from_slice(CRLF);

    if let Some(auth) = proxy_auth {
        buf.extend_from_slice(PROXY_AUTH_PREFIX);
        buf.extend_from_slice(auth.credentials().as_bytes());
        buf.extend_from_slice(CRLF);
    }

    buf.extend_from_slice(CRLF);
    buf.to_vec()
}

/// True if `buf` starts like a successful proxy or upstream response.
///
/// An empty buffer counts as success only for CONNECT.
pub fn is_http_ok(buf: &[u8], is_connect: bool) -> bool {
    if buf.is_empty() {
        return is_connect;
    }
    buf.starts_with(HTTP10_OK) || buf.starts_with(HTTP11_OK) || buf.starts_with(HTTP2_OK)
}

/// Append one line to `buf` with its ending normalized to CRLF.
/// Returns true for the empty line that ends a header block.
fn push_line(buf: &mut BytesMut, line: &[u8]) -> io::Result<bool> {
    let ended = line.ends_with(b"\n");
    let mut body = line.strip_suffix(b"\n").unwrap_or(line);
    body = body.strip_suffix(b"\r").unwrap_or(body);
    if !ended && line.len() > MAX_LINE_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "response line too long"));
    }
    buf.extend_from_slice(body);
    buf.extend_from_slice(CRLF);
    Ok(body.is_empty())
}

/// Read a response head from `reader` and probe it with [`is_http_ok`].
///
/// Reading stops at the first empty line or at end of stream.
pub fn is_http_ok_reader<R: BufRead + ?Sized>(reader: &mut R, is_connect: bool) -> io::Result<bool> {
    let mut buf = wire_buffer();
    let mut line = Vec::with_capacity(64);

    loop {
        line.clear();
        let n = Read::take(&mut *reader, MAX_LINE_LEN as u64 + 1).read_until(b'\n', &mut line)?;
        if n == 0 {
            break;
        }
        if push_line(&mut buf, &line)? {
            break;
        }
    }

    Ok(is_http_ok(&buf, is_connect))
}

/// Async twin of [`is_http_ok_reader`]
pub async fn is_http_ok_async<R>(reader: &mut R, is_connect: bool) -> io::Result<bool>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut buf = wire_buffer();
    let mut line = Vec::with_capacity(64);

    loop {
        line.clear();
        let n = (&mut *reader)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            break;
        }
        if push_line(&mut buf, &line)? {
            break;
        }
    }

    Ok(is_http_ok(&buf, is_connect))
}

/// `HTTP/<major>.<minor> 200 OK\r\n\r\n`. Versions are single digits.
pub fn status_ok_bytes(major: u8, minor: u8) -> Vec<u8> {
    debug_assert!(major < 10 && minor < 10, "HTTP versions are single digits");
    let mut buf = Vec::with_capacity(OK_STATUS_LEN);
    buf.extend_from_slice(OK_START);
    buf.extend_from_slice(&[b'0' + major % 10, b'.', b'0' + minor % 10]);
    buf.extend_from_slice(OK_END);
    buf
}

/// `host:port` from raw parts
pub fn join_host_port(host: &[u8], port: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(host.len() + 1 + port.len());
    buf.extend_from_slice(host);
    buf.push(b':');
    buf.extend_from_slice(port);
    buf
}

pub fn join_host_int_port(host: &[u8], port: u16) -> Vec<u8> {
    join_host_port(host, port.to_string().as_bytes())
}

/// ```
/// assert_eq!(wirepool::join_str_host_int_port("example.com", 8080), "example.com:8080");
/// ```
pub fn join_str_host_int_port(host: &str, port: u16) -> String {
    format!("{host}:{port}")
}

pub fn join_str_host_str_port(host: &str, port: &str) -> String {
    format!("{host}:{port}")
}

/// Header collections that can drop a header by name
pub trait HeaderDeleter {
    fn del(&mut self, name: &str);
}

/// Remove every [`HOP_HEADERS`] entry from `header`
pub fn del_hop_headers<H: HeaderDeleter + ?Sized>(header: &mut H) {
    for name in HOP_HEADERS {
        header.del(name);
    }
}

/// True if `err` means the peer or the local socket is gone
pub fn is_conn_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof | io::ErrorKind::BrokenPipe
    )
}

/// Whether a cookie scoped to `cookie_domain` may be sent to `url_host`.
///
/// Accepts an exact match or a subdomain of the cookie domain, ignoring case.
pub fn cookie_domain_valid(cookie_domain: &str, url_host: &str) -> bool {
    let domain = cookie_domain.to_ascii_lowercase();
    let host = url_host.to_ascii_lowercase();

    if domain == host {
        return true;
    }
    host.len() > domain.len()
        && host.ends_with(&domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}
