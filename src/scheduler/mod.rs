//! Request scheduling.
//!
//! [`RequestScheduler`] builds the concrete network request, hands it to a
//! worker, and returns a [`RequestHandle`] right away. Handles submitted
//! with an [`Owner`] can be cancelled as a group.

pub mod handle;
pub mod pool;
pub mod registry;

use crate::base::neterror::NetError;
use crate::bridge::CallbackBridge;
use crate::config::ClientConfig;
use crate::dispatch::dispatcher::ResponseDispatcher;
use crate::dispatch::handler::ResponseHandler;
use crate::http::orderedheaders::OrderedHeaderMap;
use crate::http::request::Request;
use crate::http::transport::{PreparedRequest, Transport};
use bytes::Bytes;
use http::Method;
use std::sync::{Arc, PoisonError, RwLock};

pub use handle::{RequestHandle, WeakHandle};
pub use pool::WorkerPool;
pub use registry::{Owner, OwnerRegistry};

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Client-wide request headers, mutable after construction.
#[derive(Debug)]
struct SharedHeaders {
    user_agent: String,
    headers: OrderedHeaderMap,
}

pub struct RequestScheduler {
    pool: WorkerPool,
    dispatcher: Arc<ResponseDispatcher>,
    registry: OwnerRegistry,
    shared: RwLock<SharedHeaders>,
    accept_language: Option<String>,
    accept_gzip: bool,
}

impl std::fmt::Debug for RequestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("pool", &self.pool)
            .field("dispatcher", &self.dispatcher)
            .field("registry", &self.registry)
            .field("accept_language", &self.accept_language)
            .field("accept_gzip", &self.accept_gzip)
            .finish_non_exhaustive()
    }
}

impl RequestScheduler {
    pub fn new(config: &ClientConfig, pool: WorkerPool, transport: Arc<dyn Transport>) -> Self {
        let mut headers = OrderedHeaderMap::new();
        for (name, value) in &config.default_headers {
            if headers.insert(name, value).is_err() {
                tracing::warn!(header = %name, "skipping invalid default header");
            }
        }

        let dispatcher = ResponseDispatcher::new(transport)
            .with_chunk_size(config.chunk_size)
            .with_default_content_length(config.default_content_length);

        Self {
            pool,
            dispatcher: Arc::new(dispatcher),
            registry: OwnerRegistry::new(),
            shared: RwLock::new(SharedHeaders {
                user_agent: config.user_agent.clone(),
                headers,
            }),
            accept_language: config.accept_language.clone(),
            accept_gzip: config.accept_gzip,
        }
    }

    /// Add a header to every request submitted from now on.
    pub fn add_header(&self, name: &str, value: &str) -> Result<(), NetError> {
        self.shared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .headers
            .insert(name, value)
    }

    /// Replace the `User-Agent` of requests submitted from now on.
    pub fn set_user_agent(&self, user_agent: &str) -> Result<(), NetError> {
        http::HeaderValue::from_str(user_agent).map_err(|_| NetError::InvalidHeader)?;
        self.shared
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .user_agent = user_agent.to_string();
        Ok(())
    }

    pub fn user_agent(&self) -> String {
        self.shared
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user_agent
            .clone()
    }

    pub fn registry(&self) -> &OwnerRegistry {
        &self.registry
    }

    /// Build the network request: default headers, then client-wide headers,
    /// then the request's own; parameters go to the query string or the
    /// body depending on the method.
    pub fn prepare(&self, request: &Request) -> Result<PreparedRequest, NetError> {
        let mut headers = OrderedHeaderMap::new();
        headers.insert("Accept", "*/*")?;
        headers.insert("Accept-Charset", "UTF-8")?;
        headers.insert("Connection", "Keep-Alive")?;
        if let Some(language) = &self.accept_language {
            headers.insert("Accept-Language", language)?;
        }
        {
            let shared = self.shared.read().unwrap_or_else(PoisonError::into_inner);
            headers.insert("User-Agent", &shared.user_agent)?;
            headers.extend(&shared.headers);
        }
        headers.extend(request.headers());
        if self.accept_gzip {
            headers.insert_if_absent("Accept-Encoding", "gzip")?;
        }

        let mut url = request.url().clone();
        let params = request.params();
        let body = if request.params_in_query() {
            if !params.is_empty() {
                url.query_pairs_mut().extend_pairs(params.iter());
            }
            request.body().to_bytes()
        } else if !request.body().is_empty() {
            request.body().to_bytes()
        } else if !params.is_empty() && matches!(*request.method(), Method::POST | Method::PUT) {
            headers.insert("Content-Type", FORM_CONTENT_TYPE)?;
            params.to_form_body()
        } else {
            Bytes::new()
        };

        if let Some(content_type) = request.content_type() {
            headers.insert("Content-Type", content_type)?;
        }

        Ok(PreparedRequest {
            method: request.method().clone(),
            url,
            headers: headers.to_header_map(),
            body,
        })
    }

    /// Schedule `request`, delivering callbacks to the context current on
    /// this thread (or directly on the worker when there is none).
    pub fn submit(
        &self,
        request: &Request,
        handler: Arc<dyn ResponseHandler>,
        owner: Option<&Owner>,
    ) -> Result<RequestHandle, NetError> {
        self.submit_with_bridge(request, CallbackBridge::capture(handler), owner)
    }

    pub fn submit_with_bridge(
        &self,
        request: &Request,
        bridge: CallbackBridge,
        owner: Option<&Owner>,
    ) -> Result<RequestHandle, NetError> {
        let prepared = self.prepare(request)?;
        let handle = RequestHandle::new();

        let dispatcher = Arc::clone(&self.dispatcher);
        let worker = handle.clone();
        self.pool.spawn(async move {
            let _finish = FinishGuard(worker.clone());
            worker.start();
            dispatcher.run(&prepared, &worker, &bridge).await;
        })?;

        if let Some(owner) = owner {
            self.registry.register(owner, &handle);
        }
        tracing::debug!(
            request = handle.id(),
            method = %request.method(),
            url = %request.url(),
            owner = owner.map(Owner::id),
            "request submitted"
        );
        Ok(handle)
    }

    /// Cancel every live request submitted under `owner` and forget it.
    pub fn cancel_all(&self, owner: &Owner, force_interrupt: bool) -> usize {
        self.registry.cancel_all(owner, force_interrupt)
    }
}

/// Wakes `RequestHandle::wait` even if a callback panics.
struct FinishGuard(RequestHandle);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}
