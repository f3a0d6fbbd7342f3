//! Streaming body copy that flushes the source

use crate::pool::LimitedPool;

use std::io::{self, Read, Write};
use std::pin::Pin;
use std::sync::OnceLock;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

const COPY_BUF_SIZE: usize = 1 << 8;
const COPY_POOL_SIZE: usize = 1 << 6;

type CopyBuf = Box<[u8; COPY_BUF_SIZE]>;

static COPY_BUFS: OnceLock<LimitedPool<CopyBuf>> = OnceLock::new();

fn copy_bufs() -> &'static LimitedPool<CopyBuf> {
    COPY_BUFS.get_or_init(|| LimitedPool::new(COPY_POOL_SIZE, || Box::new([0u8; COPY_BUF_SIZE])))
}

/// A source that can push buffered output downstream.
///
/// Proxy responses implement this so that each chunk copied out of them is
/// flushed through the pipeline behind them.
pub trait Flusher {
    fn flush_pending(&mut self);
}

/// Adapts a reader with nothing to flush
#[derive(Debug, Default)]
pub struct NoFlush<R>(pub R);

impl<R> NoFlush<R> {
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R> Flusher for NoFlush<R> {
    fn flush_pending(&mut self) {}
}

impl<R: Read> Read for NoFlush<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for NoFlush<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().0).poll_read(cx, buf)
    }
}

/// Copy `src` into `dst` through a pooled 256-byte buffer.
///
/// After every non-empty write the *source* is flushed. Returns the number of
/// bytes written.
///
/// ```
/// use wirepool::{copy_body, NoFlush};
///
/// let mut src = NoFlush(&b"hello proxy"[..]);
/// let mut dst = Vec::new();
/// assert_eq!(copy_body(&mut dst, &mut src).unwrap(), 11);
/// assert_eq!(dst, b"hello proxy");
/// ```
pub fn copy_body<W, R>(dst: &mut W, src: &mut R) -> io::Result<u64>
where
    W: Write + ?Sized,
    R: Read + Flusher + ?Sized,
{
    let mut buf = copy_bufs().get_pooled();
    let mut written = 0u64;

    loop {
        let nr = match src.read(&mut buf[..]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        dst.write_all(&buf[..nr])?;
        written += nr as u64;
        src.flush_pending();
    }

    Ok(written)
}

/// Async twin of [`copy_body`]
pub async fn copy_body_async<W, R>(dst: &mut W, src: &mut R) -> io::Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
    R: AsyncRead + Flusher + Unpin + ?Sized,
{
    let mut buf = copy_bufs().get_pooled();
    let mut written = 0u64;

    loop {
        let nr = src.read(&mut buf[..]).await?;
        if nr == 0 {
            break;
        }
        dst.write_all(&buf[..nr]).await?;
        written += nr as u64;
        src.flush_pending();
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out small chunks and counts flushes
    struct ChunkedSource {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        flushes: usize,
    }

    impl Read for ChunkedSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.chunk);
            Read::read(&mut self.data, &mut buf[..n])
        }
    }

    impl AsyncRead for ChunkedSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let n = buf.remaining().min(this.chunk);
            let mut tmp = vec![0u8; n];
            let read = Read::read(&mut this.data, &mut tmp)?;
            buf.put_slice(&tmp[..read]);
            Poll::Ready(Ok(()))
        }
    }

    impl Flusher for ChunkedSource {
        fn flush_pending(&mut self) {
            self.flushes += 1;
        }
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn source(len: usize, chunk: usize) -> ChunkedSource {
        ChunkedSource {
            data: Cursor::new((0..len).map(|i| i as u8).collect()),
            chunk,
            flushes: 0,
        }
    }

    #[test]
    fn test_copy_flushes_source_per_write() {
        let mut src = source(1000, 100);
        let mut dst = Vec::new();

        let written = copy_body(&mut dst, &mut src).unwrap();

        assert_eq!(written, 1000);
        assert_eq!(dst.len(), 1000);
        assert_eq!(src.flushes, 10);
    }

    #[test]
    fn test_copy_uses_256_byte_chunks() {
        let mut src = source(600, usize::MAX);
        let mut dst = Vec::new();

        copy_body(&mut dst, &mut src).unwrap();
        assert_eq!(src.flushes, 3);
    }

    #[test]
    fn test_copy_empty_source() {
        let mut src = source(0, 10);
        let mut dst = Vec::new();
        assert_eq!(copy_body(&mut dst, &mut src).unwrap(), 0);
        assert_eq!(src.flushes, 0);
    }

    #[test]
    fn test_copy_surfaces_write_error() {
        let mut src = source(10, 10);
        let err = copy_body(&mut BrokenSink, &mut src).unwrap_err();
        assert!(crate::wire::is_conn_closed(&err));
        assert_eq!(src.flushes, 0);
    }

    /// Source whose upstream resets after `good` bytes
    struct ResettingSource {
        good: usize,
        flushes: usize,
    }

    impl Read for ResettingSource {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.good == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "upstream reset"));
            }
            let n = buf.len().min(self.good);
            buf[..n].fill(b'x');
            self.good -= n;
            Ok(n)
        }
    }

    impl AsyncRead for ResettingSource {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            let this = self.get_mut();
            let mut tmp = vec![0u8; buf.remaining()];
            let result = Read::read(this, &mut tmp).map(|n| buf.put_slice(&tmp[..n]));
            Poll::Ready(result)
        }
    }

    impl Flusher for ResettingSource {
        fn flush_pending(&mut self) {
            self.flushes += 1;
        }
    }

    #[test]
    fn test_copy_surfaces_read_error() {
        let mut src = ResettingSource { good: 300, flushes: 0 };
        let mut dst = Vec::new();

        let err = copy_body(&mut dst, &mut src).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(dst.len(), 300);
        assert_eq!(src.flushes, 2);
    }

    #[tokio::test]
    async fn test_copy_async_surfaces_read_error() {
        let mut src = ResettingSource { good: 0, flushes: 0 };
        let mut dst = Vec::new();

        let err = copy_body_async(&mut dst, &mut src).await.unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert!(dst.is_empty());
    }

    #[tokio::test]
    async fn test_copy_async() {
        let mut src = source(700, 64);
        let mut dst = Vec::new();

        let written = copy_body_async(&mut dst, &mut src).await.unwrap();

        assert_eq!(written, 700);
        assert_eq!(dst, (0..700).map(|i| i as u8).collect::<Vec<u8>>());
        assert_eq!(src.flushes, 11);
    }

    #[tokio::test]
    async fn test_copy_async_no_flush() {
        let mut src = NoFlush(&b"tunnel bytes"[..]);
        let mut dst = Vec::new();
        assert_eq!(copy_body_async(&mut dst, &mut src).await.unwrap(), 12);
    }
}
