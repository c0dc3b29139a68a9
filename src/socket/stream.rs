//! Type-erased connections.
//!
//! A caller-supplied TLS layer wraps a TCP stream (or a proxy tunnel) and
//! hands back another [`BoxedSocket`]; nothing above the connect job sees the
//! concrete type.

use tokio::io::{AsyncRead, AsyncWrite};

/// Any byte stream a connection can run over.
pub trait StreamSocket: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> StreamSocket for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

pub type BoxedSocket = Box<dyn StreamSocket>;

/// Erase the concrete stream type.
pub fn boxed<S: StreamSocket>(socket: S) -> BoxedSocket {
    Box::new(socket)
}
