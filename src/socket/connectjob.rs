use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::proxy::ProxySettings;
use crate::socket::stream::{boxed, BoxedSocket};
use crate::socket::tls::TlsConnect;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

/// Upper bound on a proxy's CONNECT response head.
const MAX_TUNNEL_RESPONSE: usize = 8 * 1024;

/// Manages the connection process: DNS -> TCP -> proxy tunnel -> TLS.
pub struct ConnectJob<'a> {
    url: &'a Url,
    proxy: Option<&'a ProxySettings>,
    tls: Option<&'a dyn TlsConnect>,
    timeout: Duration,
}

impl<'a> ConnectJob<'a> {
    pub fn new(url: &'a Url, timeout: Duration) -> Self {
        Self {
            url,
            proxy: None,
            tls: None,
            timeout,
        }
    }

    pub fn proxy(mut self, proxy: Option<&'a ProxySettings>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn tls(mut self, tls: Option<&'a dyn TlsConnect>) -> Self {
        self.tls = tls;
        self
    }

    pub async fn connect(self) -> Result<BoxedSocket, NetError> {
        let secure = match self.url.scheme() {
            "http" => false,
            "https" if self.tls.is_some() => true,
            scheme => {
                tracing::debug!(scheme, "no connector for scheme");
                return Err(NetError::UnknownUrlScheme);
            }
        };

        let target_host = self.url.host_str().ok_or(NetError::InvalidUrl)?;
        let target_port = self.url.port_or_known_default().ok_or(NetError::InvalidUrl)?;

        // With a proxy, TCP goes to the proxy first.
        let (host, port) = match self.proxy {
            Some(p) => p.host_port().ok_or(NetError::InvalidUrl)?,
            None => (target_host, target_port),
        };

        let stream = self.connect_tcp(host, port).await.map_err(|e| {
            if self.proxy.is_some() {
                NetError::ProxyConnectionFailed
            } else {
                e
            }
        })?;
        let mut socket = boxed(stream);

        if let (Some(proxy), true) = (self.proxy, secure) {
            socket = self.tunnel(socket, proxy, target_host, target_port).await?;
        }

        match (secure, self.tls) {
            (true, Some(tls)) => {
                let handshake = tls.connect(target_host.to_string(), socket);
                match tokio::time::timeout(self.timeout, handshake).await {
                    Ok(Ok(socket)) => Ok(socket),
                    Ok(Err(e)) => {
                        tracing::debug!(host = target_host, error = %e, "TLS handshake failed");
                        Err(NetError::SslProtocolError)
                    }
                    Err(_) => Err(NetError::ConnectionTimedOut),
                }
            }
            _ => Ok(socket),
        }
    }

    async fn connect_tcp(&self, host: &str, port: u16) -> Result<TcpStream, NetError> {
        let addrs = tokio::net::lookup_host((host, port)).await.dns_context(host)?;

        let mut last_err = NetError::NameNotResolved;
        for addr in addrs {
            match tokio::time::timeout(self.timeout, TcpStream::connect(addr)).await {
                Ok(result) => match result.connection_context(host, port) {
                    Ok(stream) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
                        }
                        return Ok(stream);
                    }
                    Err(e) => last_err = e,
                },
                Err(_) => {
                    tracing::debug!(host, port, %addr, "connect timed out");
                    last_err = NetError::ConnectionTimedOut;
                }
            }
        }
        Err(last_err)
    }

    /// Establish an HTTP CONNECT tunnel through the proxy.
    async fn tunnel(
        &self,
        mut socket: BoxedSocket,
        proxy: &ProxySettings,
        host: &str,
        port: u16,
    ) -> Result<BoxedSocket, NetError> {
        let target = format!("{}:{}", host, port);
        let mut connect_req = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", target, target);
        if let Some(auth) = proxy.get_auth_header() {
            connect_req.push_str(&format!("Proxy-Authorization: {}\r\n", auth.as_str()));
        }
        connect_req.push_str("\r\n");

        let exchange = async {
            socket.write_all(connect_req.as_bytes()).await?;

            let mut head = Vec::with_capacity(256);
            let mut buf = [0u8; 512];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await?;
                if n == 0 || head.len() + n > MAX_TUNNEL_RESPONSE {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "malformed CONNECT response",
                    ));
                }
                head.extend_from_slice(&buf[..n]);
            }
            Ok(head)
        };

        let head = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(head)) => head,
            Ok(Err(e)) => {
                tracing::debug!(proxy = %proxy.url, error = %e, "proxy tunnel failed");
                return Err(NetError::TunnelConnectionFailed);
            }
            Err(_) => return Err(NetError::ConnectionTimedOut),
        };

        let status_line = String::from_utf8_lossy(&head);
        let status_line = status_line.lines().next().unwrap_or_default();
        let ok = status_line
            .split_whitespace()
            .nth(1)
            .is_some_and(|code| code == "200");
        if !ok {
            tracing::debug!(proxy = %proxy.url, status = status_line, "proxy refused tunnel");
            return Err(NetError::TunnelConnectionFailed);
        }
        Ok(socket)
    }
}
