//! # asyncnet
//!
//! A minimal asynchronous HTTP client that streams responses in chunks and
//! delivers lifecycle callbacks on the thread that issued the request.
//!
//! Requests run on a worker pool. Each one reports `on_start`, then either
//! the receive sequence (`on_receive_start`, `on_receive_segment`...,
//! `on_receive_end`) and `on_success`, or `on_failure`; `on_finish` is
//! always last. When the sending thread has entered a [`CallbackLoop`],
//! callbacks are queued there in order; otherwise they run on the worker.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use asyncnet::{AsyncHttpClient, CallbackLoop, Owner, ResponseHandler};
//! use std::sync::Arc;
//!
//! struct Screen;
//! impl ResponseHandler for Screen {
//!     fn on_success(&self, body: &bytes::Bytes) {
//!         println!("{} bytes", body.len());
//!     }
//! }
//!
//! let client = AsyncHttpClient::new();
//! let owner = Owner::new();
//! let mut looper = CallbackLoop::new();
//! let _guard = looper.enter();
//!
//! client.get("http://example.com/").owner(&owner).send(Arc::new(Screen))?;
//! looper.blocking_turn();
//!
//! // Screen destroyed: drop everything still in flight.
//! client.cancel_all(&owner, true);
//! ```
//!
//! ## Modules
//!
//! - [`client`] - Client, builders and configuration calls
//! - [`scheduler`] - Worker pool, request handles and the owner registry
//! - [`dispatch`] - Response events, the handler trait and the dispatcher
//! - [`bridge`] - Callback loops and event delivery
//! - [`http`] - Requests, the transport seam and the bundled hyper transport
//! - [`socket`] - Connection limits, connect jobs, proxies and TLS hooks
//! - [`base`] - Error types

pub mod base;
pub mod bridge;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod http;
pub mod scheduler;
pub mod socket;

pub use base::error::HttpError;
pub use base::neterror::NetError;
pub use bridge::{CallbackBridge, CallbackContext, CallbackLoop};
pub use client::{AsyncHttpClient, ClientBuilder, RequestBuilder};
pub use config::ClientConfig;
pub use dispatch::{ResponseEvent, ResponseHandler};
pub use scheduler::{Owner, RequestHandle};
