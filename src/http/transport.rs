//! The seam between request dispatch and network I/O.
//!
//! A [`Transport`] turns a [`PreparedRequest`] into a [`TransportResponse`]:
//! status, headers, declared length and an optional byte stream. Everything
//! below that line (connections, proxies, redirects, retries, decoding) is
//! the transport's business.

use crate::base::neterror::NetError;
use bytes::Bytes;
use futures::future::BoxFuture;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;
use url::Url;

/// Response body as an async byte stream.
pub type BodyReader = Pin<Box<dyn AsyncRead + Send>>;

/// Alias for the `Future` returned by [`Transport::execute`].
pub type Executing<'a> = BoxFuture<'a, Result<TransportResponse, NetError>>;

/// Performs the network side of a request.
///
/// Implementations must be thread-safe; one transport serves every request
/// of a client concurrently.
pub trait Transport: Send + Sync + 'static {
    fn execute<'a>(&'a self, request: &'a PreparedRequest) -> Executing<'a>;
}

/// The concrete network request built from a caller's request.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    /// Final URL, query string included.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl PreparedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }
}

pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    content_length: Option<u64>,
    body: Option<BodyReader>,
}

impl TransportResponse {
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        content_length: Option<u64>,
        body: Option<BodyReader>,
    ) -> Self {
        Self {
            status,
            headers,
            content_length,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Declared length, `None` when unknown (chunked or decoded bodies).
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Charset parameter of the `Content-Type` header.
    pub fn charset(&self) -> Option<String> {
        let value = self.headers.get(http::header::CONTENT_TYPE)?.to_str().ok()?;
        value.split(';').skip(1).find_map(|param| {
            let (name, value) = param.split_once('=')?;
            if name.trim().eq_ignore_ascii_case("charset") {
                Some(value.trim().trim_matches('"').to_string())
            } else {
                None
            }
        })
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Take the body stream. Subsequent calls return `None`.
    pub fn take_body(&mut self) -> Option<BodyReader> {
        self.body.take()
    }

    /// Drop the body stream, releasing the connection behind it.
    pub fn close(&mut self) {
        self.body = None;
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}
