//! Ergonomic error context helpers.
//!
//! Provides extension traits for adding context to `Result` types,
//! converting IO errors into `NetError` codes while logging what failed.

use crate::base::neterror::NetError;
use std::io;

/// Extension trait for adding context to IO Results.
pub trait IoResultExt<T> {
    /// Map a connect failure, logging the target it was for.
    ///
    /// # Example
    /// ```ignore
    /// use asyncnet::base::context::IoResultExt;
    ///
    /// let stream = TcpStream::connect(addr).await
    ///     .connection_context("example.com", 80)?;
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Map a DNS resolution failure.
    fn dns_context(self, host: &str) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, port, error = %e, "connect failed");
            NetError::from(e)
        })
    }

    fn dns_context(self, host: &str) -> Result<T, NetError> {
        self.map_err(|e| {
            tracing::debug!(host = %host, error = %e, "name resolution failed");
            NetError::NameNotResolved
        })
    }
}
