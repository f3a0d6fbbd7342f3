//! Raw HTTP/1.x request serialization

use crate::errors::{WireError, WireResult};
use crate::wire::{self, HeaderDeleter, CRLF, HEADER_SEP, HOST_PREFIX};

use bytes::BufMut;
use std::fmt;
use std::io::{self, Read};

/// Header multimap that keeps names in insertion order.
///
/// Names compare case-insensitively; the first spelling seen is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Vec<String>)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Append a value, keeping any existing values for the name
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1.push(value.into()),
            None => self.entries.push((name, vec![value.into()])),
        }
    }

    /// Replace all values for the name
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.set_all(name, vec![value.into()]);
    }

    pub fn set_all(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => self.entries[idx].1 = values,
            None => self.entries.push((name, values)),
        }
    }

    /// First value for the name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        match self.position(name) {
            Some(idx) => &self.entries[idx].1,
            None => &[],
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.position(name).map(|idx| self.entries.remove(idx).1)
    }

    /// Number of distinct names
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }
}

impl HeaderDeleter for Headers {
    fn del(&mut self, name: &str) {
        self.remove(name);
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (name, value) in iter {
            headers.add(name, value);
        }
        headers
    }
}

/// Copy every header from `src` into `dst`, replacing values for shared names
pub fn copy_headers(dst: &mut Headers, src: &Headers) {
    for (name, values) in src.iter() {
        dst.set_all(name, values.to_vec());
    }
}

pub type Body = Box<dyn Read + Send>;

/// Produces a fresh body stream each time it is called
pub type BodyFactory = Box<dyn Fn() -> io::Result<Body> + Send + Sync>;

/// The parts of a request that [`build_request_bytes`] writes out
pub struct RawRequest {
    pub method: String,
    pub path: String,
    pub proto: String,
    /// Explicit Host, taking precedence over everything else
    pub host: Option<String>,
    /// Host taken from the request URL
    pub url_host: Option<String>,
    pub headers: Headers,
    pub body: Option<Body>,
    pub body_factory: Option<BodyFactory>,
}

impl RawRequest {
    /// An `HTTP/1.1` request with no headers or body
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            proto: "HTTP/1.1".to_string(),
            host: None,
            url_host: None,
            headers: Headers::new(),
            body: None,
            body_factory: None,
        }
    }

    pub fn with_proto(mut self, proto: impl Into<String>) -> Self {
        self.proto = proto.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_url_host(mut self, host: impl Into<String>) -> Self {
        self.url_host = Some(host.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value);
        self
    }

    pub fn with_body<R: Read + Send + 'static>(mut self, body: R) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    pub fn with_body_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> io::Result<Body> + Send + Sync + 'static,
    {
        self.body_factory = Some(Box::new(factory));
        self
    }

    /// Explicit host, then URL host, then the first `Host` header, else empty
    pub fn resolved_host(&self) -> &str {
        [self.host.as_deref(), self.url_host.as_deref()]
            .into_iter()
            .flatten()
            .find(|h| !h.is_empty())
            .or_else(|| self.headers.get("Host"))
            .unwrap_or("")
    }
}

impl fmt::Debug for RawRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("proto", &self.proto)
            .field("host", &self.resolved_host())
            .field("headers", &self.headers)
            .field("body", &self.body.is_some())
            .field("body_factory", &self.body_factory.is_some())
            .finish()
    }
}

/// Serialize `req` as raw HTTP/1.x bytes
///
/// When a body factory is set it is called for a fresh body, replacing any
/// body already present. The body is read to the end and then dropped. A
/// failing factory or body yields [`WireError::Producer`] and no bytes.
///
/// ```
/// use wirepool::{build_request_bytes, RawRequest};
///
/// let mut req = RawRequest::new("GET", "/index.html")
///     .with_host("example.com")
///     .with_header("Accept", "*/*");
///
/// let bytes = build_request_bytes(&mut req).unwrap();
/// assert_eq!(
///     bytes,
///     b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n"
/// );
/// ```
pub fn build_request_bytes(req: &mut RawRequest) -> WireResult<Vec<u8>> {
    let mut buf = wire::wire_buffer();

    buf.extend_from_slice(req.method.as_bytes());
    buf.put_u8(b' ');
    buf.extend_from_slice(req.path.as_bytes());
    buf.put_u8(b' ');
    buf.extend_from_slice(req.proto.as_bytes());
    buf.extend_from_slice(CRLF);

    buf.extend_from_slice(HOST_PREFIX);
    buf.extend_from_slice(req.resolved_host().as_bytes());
    buf.extend_from_slice(CRLF);

    for (name, values) in req.headers.iter() {
        for value in values {
            buf.extend_from_slice(name.as_bytes());
            buf.extend_from_slice(HEADER_SEP);
            buf.extend_from_slice(value.as_bytes());
            buf.extend_from_slice(CRLF);
        }
    }
    buf.extend_from_slice(CRLF);

    if let Some(factory) = &req.body_factory {
        req.body = Some(factory().map_err(WireError::Producer)?);
    }

    if let Some(mut body) = req.body.take() {
        let mut writer = (&mut *buf).writer();
        io::copy(&mut body, &mut writer).map_err(WireError::Producer)?;
    }

    Ok(buf.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::del_hop_headers;
    use std::io::Cursor;

    struct FailingBody;

    impl Read for FailingBody {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream reset"))
        }
    }

    #[test]
    fn test_headers_multimap() {
        let mut headers = Headers::new();
        headers.add("Accept", "text/html");
        headers.add("accept", "*/*");
        headers.add("X-Id", "1");

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get_all("ACCEPT"), &["text/html".to_string(), "*/*".to_string()]);
        assert_eq!(headers.get("x-id"), Some("1"));

        headers.set("Accept", "application/json");
        assert_eq!(headers.get_all("Accept").len(), 1);
    }

    #[test]
    fn test_hop_headers_stripped() {
        let mut headers: Headers = [
            ("Connection", "keep-alive"),
            ("Keep-Alive", "timeout=5"),
            ("Proxy-Connection", "keep-alive"),
            ("TE", "trailers"),
            ("Transfer-Encoding", "chunked"),
            ("Upgrade", "h2c"),
            ("Proxy-Authenticate", "Basic"),
            ("Trailers", "Expires"),
            ("Accept", "*/*"),
            ("Cookie", "a=b"),
        ]
        .into_iter()
        .collect();

        del_hop_headers(&mut headers);
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Accept", "Cookie"]);

        let once = headers.clone();
        del_hop_headers(&mut headers);
        assert_eq!(headers, once);
    }

    #[test]
    fn test_copy_headers_replaces_values() {
        let mut dst: Headers = [("Accept", "text/html"), ("X-Keep", "1")].into_iter().collect();
        let src: Headers = [("accept", "*/*"), ("X-New", "2")].into_iter().collect();

        copy_headers(&mut dst, &src);
        assert_eq!(dst.get_all("Accept"), &["*/*".to_string()]);
        assert_eq!(dst.get("X-Keep"), Some("1"));
        assert_eq!(dst.get("X-New"), Some("2"));
    }

    #[test]
    fn test_host_resolution_order() {
        let req = RawRequest::new("GET", "/")
            .with_host("explicit")
            .with_url_host("url")
            .with_header("Host", "header");
        assert_eq!(req.resolved_host(), "explicit");

        let req = RawRequest::new("GET", "/").with_url_host("url").with_header("Host", "header");
        assert_eq!(req.resolved_host(), "url");

        let req = RawRequest::new("GET", "/").with_host("").with_header("Host", "header");
        assert_eq!(req.resolved_host(), "header");

        assert_eq!(RawRequest::new("GET", "/").resolved_host(), "");
    }

    #[test]
    fn test_headers_written_in_insertion_order() {
        let mut req = RawRequest::new("POST", "/api")
            .with_proto("HTTP/1.0")
            .with_url_host("api.example")
            .with_header("B", "1")
            .with_header("A", "2")
            .with_header("B", "3");

        let bytes = build_request_bytes(&mut req).unwrap();
        assert_eq!(
            bytes,
            b"POST /api HTTP/1.0\r\nHost: api.example\r\nB: 1\r\nB: 3\r\nA: 2\r\n\r\n".to_vec()
        );
    }

    #[test]
    fn test_body_is_appended() {
        let mut req = RawRequest::new("PUT", "/k")
            .with_host("h")
            .with_body(Cursor::new(b"payload".to_vec()));

        let bytes = build_request_bytes(&mut req).unwrap();
        assert!(bytes.ends_with(b"\r\n\r\npayload"));
        assert!(req.body.is_none());
    }

    #[test]
    fn test_body_factory_reacquires() {
        let mut req = RawRequest::new("POST", "/")
            .with_host("h")
            .with_body(Cursor::new(b"stale".to_vec()))
            .with_body_factory(|| Ok(Box::new(Cursor::new(b"fresh".to_vec())) as Body));

        let first = build_request_bytes(&mut req).unwrap();
        let second = build_request_bytes(&mut req).unwrap();
        assert!(first.ends_with(b"fresh"));
        assert_eq!(first, second);
    }

    #[test]
    fn test_failing_body_is_producer_error() {
        let mut req = RawRequest::new("POST", "/").with_host("h").with_body(FailingBody);

        let err = build_request_bytes(&mut req).unwrap_err();
        assert!(matches!(err, WireError::Producer(_)));
        assert_eq!(err.io_error().kind(), io::ErrorKind::ConnectionReset);
    }

    #[test]
    fn test_failing_factory_is_producer_error() {
        let mut req = RawRequest::new("POST", "/")
            .with_body_factory(|| Err(io::Error::other("no body")));

        assert!(matches!(build_request_bytes(&mut req), Err(WireError::Producer(_))));
    }
}
