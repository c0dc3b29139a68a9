//! Pluggable TLS.
//!
//! No TLS stack is bundled. `https` URLs are served only when the client is
//! built with a [`TlsConnect`] implementation; the connector receives the
//! already-connected socket (possibly a proxy tunnel) and the server name.

use crate::socket::stream::BoxedSocket;
use futures::future::BoxFuture;
use std::io;

/// Alias for the `Future` returned by [`TlsConnect::connect`].
pub type Handshaking = BoxFuture<'static, io::Result<BoxedSocket>>;

/// Wraps a connected socket in TLS.
pub trait TlsConnect: Send + Sync {
    /// Perform the client handshake for `domain` over `stream`.
    fn connect(&self, domain: String, stream: BoxedSocket) -> Handshaking;
}
