//! Socket and connection management.
//!
//! - [`pool`]: per-route and total connection caps
//! - [`connectjob`]: DNS → TCP → proxy tunnel → TLS connection flow
//! - [`proxy`]: HTTP forward proxy settings
//! - [`stream`]: the boxed byte stream handed to hyper
//! - [`tls`]: the pluggable TLS connector

pub mod connectjob;
pub mod pool;
pub mod proxy;
pub mod stream;
pub mod tls;
