//! The bundled hyper-based [`Transport`].

use crate::base::neterror::NetError;
use crate::config::ClientConfig;
use crate::http::responsebody::{GzipReader, IncomingReader};
use crate::http::retry::RetryPolicy;
use crate::http::streamfactory::{HttpStream, HttpStreamFactory};
use crate::http::transport::{BodyReader, Executing, PreparedRequest, Transport, TransportResponse};
use crate::socket::pool::ConnectionLimiter;
use crate::socket::proxy::ProxySettings;
use crate::socket::tls::TlsConnect;
use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderValue};
use http::{Method, Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// HTTP/1.1 over TCP with redirects, retries, proxying and gzip decoding.
pub struct HttpTransport {
    factory: HttpStreamFactory,
    retry: RetryPolicy,
    timeout: Duration,
    follow_redirects: bool,
    max_redirects: usize,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("limiter", self.factory.limiter())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("follow_redirects", &self.follow_redirects)
            .field("max_redirects", &self.max_redirects)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(config: &ClientConfig, tls: Option<Arc<dyn TlsConnect>>) -> Self {
        let timeout = config.socket_timeout();
        let limiter = ConnectionLimiter::new(config.max_connections, config.max_connections, timeout);

        let proxy = config.proxy.as_deref().and_then(|raw| {
            match ProxySettings::new(raw) {
                Ok(proxy) => Some(match config.no_proxy.as_deref() {
                    Some(no_proxy) => proxy.with_bypass(no_proxy),
                    None => proxy,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring unusable proxy setting");
                    None
                }
            }
        });

        let factory = HttpStreamFactory::new(limiter, timeout)
            .with_proxy(proxy)
            .with_tls(tls);

        Self {
            factory,
            retry: RetryPolicy::new(config.max_retries),
            timeout,
            follow_redirects: config.follow_redirects,
            max_redirects: config.max_redirects,
        }
    }

    async fn run(&self, request: &PreparedRequest) -> Result<TransportResponse, NetError> {
        let mut method = request.method.clone();
        let mut url = request.url.clone();
        let mut headers = request.headers.clone();
        let mut body = request.body.clone();
        let mut redirects = 0;

        loop {
            let (response, stream) = self.send_with_retries(&method, &url, &headers, &body).await?;

            let status = response.status();
            let location = response.headers().get(header::LOCATION).cloned();
            let location = match location {
                Some(location) if self.follow_redirects && is_redirect(status) => location,
                _ => return Ok(self.finish(response, stream, &method)),
            };

            if redirects >= self.max_redirects {
                return Err(NetError::TooManyRedirects);
            }
            let next = location
                .to_str()
                .ok()
                .and_then(|loc| url.join(loc).ok())
                .filter(|next| matches!(next.scheme(), "http" | "https"))
                .ok_or(NetError::InvalidRedirect)?;

            if matches!(
                status,
                StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
            ) {
                if method != Method::HEAD {
                    method = Method::GET;
                }
                body = Bytes::new();
                headers.remove(header::CONTENT_TYPE);
                headers.remove(header::CONTENT_LENGTH);
            }
            if next.host_str() != url.host_str() {
                headers.remove(header::AUTHORIZATION);
            }
            headers.remove(header::HOST);

            tracing::debug!(status = status.as_u16(), from = %url, to = %next, "following redirect");
            redirects += 1;
            url = next;
            // Dropping the previous response closes its connection.
            drop(response);
            drop(stream);
        }
    }

    async fn send_with_retries(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<(Response<Incoming>, HttpStream), NetError> {
        let mut failed = 0;
        loop {
            let error = match self.send_once(method, url, headers, body).await {
                Ok(sent) => return Ok(sent),
                Err(e) => e,
            };
            failed += 1;
            let Some((reason, delay)) = self.retry.next(failed, &error) else {
                return Err(error);
            };
            tracing::warn!(url = %url, error = %error, ?reason, retry = failed, ?delay, "retrying request");
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<(Response<Incoming>, HttpStream), NetError> {
        let mut stream = self.factory.request_stream(url).await?;

        let target = if stream.is_forward_proxied() {
            url.as_str().to_string()
        } else {
            let mut target = url.path().to_string();
            if let Some(query) = url.query() {
                target.push('?');
                target.push_str(query);
            }
            target
        };

        let mut req = Request::builder()
            .method(method.clone())
            .uri(target)
            .body(Full::new(body.clone()))
            .map_err(|_| NetError::InvalidUrl)?;
        *req.headers_mut() = headers.clone();

        if !req.headers().contains_key(header::HOST) {
            req.headers_mut().insert(header::HOST, host_header(url)?);
        }
        if let Some(auth) = stream.proxy_authorization() {
            req.headers_mut()
                .insert(header::PROXY_AUTHORIZATION, auth.clone());
        }

        tracing::debug!(method = %method, url = %url, "sending request");
        let response = tokio::time::timeout(self.timeout, stream.send_request(req))
            .await
            .map_err(|_| NetError::ConnectionTimedOut)??;
        tracing::debug!(url = %url, status = response.status().as_u16(), "response headers received");

        Ok((response, stream))
    }

    fn finish(
        &self,
        response: Response<Incoming>,
        stream: HttpStream,
        method: &Method,
    ) -> TransportResponse {
        let (parts, incoming) = response.into_parts();
        let status = parts.status;
        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let bodiless = *method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
            || declared == Some(0);
        if bodiless {
            return TransportResponse::new(status, parts.headers, declared, None);
        }

        let reader = IncomingReader::new(incoming, stream, Some(self.timeout));
        let gzip = parts
            .headers
            .get(header::CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("gzip"));

        let (body, content_length): (BodyReader, _) = if gzip {
            (Box::pin(GzipReader::new(reader)), None)
        } else {
            (Box::pin(reader), declared)
        };
        TransportResponse::new(status, parts.headers, content_length, Some(body))
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(&'a self, request: &'a PreparedRequest) -> Executing<'a> {
        Box::pin(self.run(request))
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn host_header(url: &Url) -> Result<HeaderValue, NetError> {
    let host = url.host_str().ok_or(NetError::InvalidUrl)?;
    let value = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).map_err(|_| NetError::InvalidUrl)
}
