//! Response body streaming.
//!
//! [`IncomingReader`] adapts a hyper body to `AsyncRead` and keeps the
//! connection alive while it is read; [`GzipReader`] decodes a gzip stream
//! incrementally on top of any reader.

use crate::http::streamfactory::HttpStream;
use bytes::{Buf, Bytes};
use flate2::write::GzDecoder;
use http_body::Body;
use hyper::body::Incoming;
use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::time::Sleep;

/// `AsyncRead` over a hyper response body.
///
/// A read that sees no data for `read_timeout` fails with `TimedOut`.
pub struct IncomingReader {
    body: Incoming,
    pending: Bytes,
    done: bool,
    read_timeout: Option<Duration>,
    idle: Option<Pin<Box<Sleep>>>,
    _stream: HttpStream,
}

impl IncomingReader {
    pub fn new(body: Incoming, stream: HttpStream, read_timeout: Option<Duration>) -> Self {
        Self {
            body,
            pending: Bytes::new(),
            done: false,
            read_timeout,
            idle: None,
            _stream: stream,
        }
    }
}

impl AsyncRead for IncomingReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pending.has_remaining() {
                let n = this.pending.len().min(buf.remaining());
                buf.put_slice(&this.pending.split_to(n));
                this.idle = None;
                return Poll::Ready(Ok(()));
            }
            if this.done {
                return Poll::Ready(Ok(()));
            }

            match Pin::new(&mut this.body).poll_frame(cx) {
                Poll::Ready(Some(Ok(frame))) => {
                    // Trailers carry no payload.
                    if let Ok(data) = frame.into_data() {
                        this.pending = data;
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    let kind = if e.is_incomplete_message() {
                        io::ErrorKind::UnexpectedEof
                    } else {
                        io::ErrorKind::Other
                    };
                    return Poll::Ready(Err(io::Error::new(kind, e)));
                }
                Poll::Ready(None) => {
                    this.done = true;
                }
                Poll::Pending => {
                    if let Some(timeout) = this.read_timeout {
                        let idle = this
                            .idle
                            .get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
                        if idle.as_mut().poll(cx).is_ready() {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::TimedOut,
                                "response body read timed out",
                            )));
                        }
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

/// Incremental gzip decoder over an async byte stream.
pub struct GzipReader<R> {
    inner: R,
    decoder: GzDecoder<Vec<u8>>,
    pos: usize,
    eof: bool,
    finished: bool,
}

impl<R: AsyncRead + Unpin> GzipReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: GzDecoder::new(Vec::new()),
            pos: 0,
            eof: false,
            finished: false,
        }
    }
}

fn invalid_data(e: io::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

impl<R: AsyncRead + Unpin> AsyncRead for GzipReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            let decoded = this.decoder.get_mut();
            if this.pos < decoded.len() {
                let n = (decoded.len() - this.pos).min(buf.remaining());
                buf.put_slice(&decoded[this.pos..this.pos + n]);
                this.pos += n;
                if this.pos == decoded.len() {
                    decoded.clear();
                    this.pos = 0;
                }
                return Poll::Ready(Ok(()));
            }
            if this.finished {
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                this.decoder.try_finish().map_err(invalid_data)?;
                this.finished = true;
                continue;
            }

            let mut raw = [0u8; 4096];
            let mut raw_buf = ReadBuf::new(&mut raw);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut raw_buf))?;
            if raw_buf.filled().is_empty() {
                this.eof = true;
            } else {
                this.decoder
                    .write_all(raw_buf.filled())
                    .map_err(invalid_data)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tokio::io::AsyncReadExt;

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[tokio::test]
    async fn test_gzip_decodes_in_small_reads() {
        let plain: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = GzipReader::new(std::io::Cursor::new(gzip(&plain)));

        let mut out = Vec::new();
        let mut chunk = [0u8; 100];
        loop {
            let n = reader.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(out, plain);
    }

    #[tokio::test]
    async fn test_gzip_over_split_stream() {
        let compressed = gzip(b"hello gzip world");
        let (mut tx, rx) = tokio::io::duplex(8);
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            for piece in compressed.chunks(3) {
                tx.write_all(piece).await.unwrap();
            }
        });

        let mut out = String::new();
        GzipReader::new(rx).read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "hello gzip world");
    }

    #[tokio::test]
    async fn test_gzip_rejects_garbage() {
        let mut reader = GzipReader::new(std::io::Cursor::new(b"definitely not gzip".to_vec()));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
