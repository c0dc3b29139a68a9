use crate::base::neterror::NetError;
use crate::socket::connectjob::ConnectJob;
use crate::socket::pool::{ConnectionLimiter, ConnectionPermit};
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::TlsConnect;
use bytes::Bytes;
use http::{HeaderValue, Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// One HTTP/1.1 connection with its driver task.
///
/// Dropping the stream aborts the driver and closes the socket, then frees
/// the connection slot.
pub struct HttpStream {
    sender: http1::SendRequest<Full<Bytes>>,
    driver: JoinHandle<()>,
    proxy_authorization: Option<HeaderValue>,
    forward_proxied: bool,
    _permit: ConnectionPermit,
}

impl HttpStream {
    /// Whether requests must use absolute-form targets for a forward proxy.
    pub fn is_forward_proxied(&self) -> bool {
        self.forward_proxied
    }

    pub fn proxy_authorization(&self) -> Option<&HeaderValue> {
        self.proxy_authorization.as_ref()
    }

    pub async fn send_request(
        &mut self,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, NetError> {
        self.sender.ready().await.map_err(map_hyper_error)?;
        self.sender.send_request(req).await.map_err(map_hyper_error)
    }
}

impl Drop for HttpStream {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

fn map_hyper_error(e: hyper::Error) -> NetError {
    tracing::debug!(error = %e, "request failed");
    if e.is_incomplete_message() {
        NetError::EmptyResponse
    } else if e.is_parse() {
        NetError::InvalidHttpResponse
    } else if e.is_canceled() || e.is_closed() {
        NetError::ConnectionClosed
    } else {
        NetError::ConnectionFailed
    }
}

/// Opens [`HttpStream`]s: slot, socket, handshake.
pub struct HttpStreamFactory {
    limiter: ConnectionLimiter,
    proxy: Option<ProxySettings>,
    tls: Option<Arc<dyn TlsConnect>>,
    connect_timeout: Duration,
}

impl HttpStreamFactory {
    pub fn new(limiter: ConnectionLimiter, connect_timeout: Duration) -> Self {
        Self {
            limiter,
            proxy: None,
            tls: None,
            connect_timeout,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<ProxySettings>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_tls(mut self, tls: Option<Arc<dyn TlsConnect>>) -> Self {
        self.tls = tls;
        self
    }

    pub fn limiter(&self) -> &ConnectionLimiter {
        &self.limiter
    }

    fn proxy_for(&self, url: &Url) -> Option<&ProxySettings> {
        self.proxy.as_ref().filter(|p| !p.should_bypass(url))
    }

    pub async fn request_stream(&self, url: &Url) -> Result<HttpStream, NetError> {
        let permit = self.limiter.acquire(url).await?;
        let proxy = self.proxy_for(url);

        let socket = ConnectJob::new(url, self.connect_timeout)
            .proxy(proxy)
            .tls(self.tls.as_deref())
            .connect()
            .await?;

        let (sender, conn) = http1::handshake(TokioIo::new(socket))
            .await
            .map_err(|e| {
                tracing::debug!(error = %e, "HTTP/1.1 handshake failed");
                NetError::ConnectionFailed
            })?;

        let driver = tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "connection closed with error");
            }
        });

        // https goes through a CONNECT tunnel and needs no proxy headers.
        let forward_proxied = proxy.is_some() && url.scheme() == "http";
        let proxy_authorization = proxy
            .filter(|_| forward_proxied)
            .and_then(|p| p.get_auth_header())
            .and_then(|auth| HeaderValue::from_str(auth.as_str()).ok())
            .map(|mut value| {
                value.set_sensitive(true);
                value
            });

        tracing::trace!(url = %url, via_proxy = proxy.is_some(), "connection established");

        Ok(HttpStream {
            sender,
            driver,
            proxy_authorization,
            forward_proxied,
            _permit: permit,
        })
    }
}
