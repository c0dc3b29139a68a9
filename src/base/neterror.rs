use std::io;
use thiserror::Error;

/// Declares `NetError` together with its numeric code table.
macro_rules! net_errors {
    ($( $(#[$doc:meta])* $variant:ident = $code:literal => $msg:tt, )*) => {
        /// Transport-level failure codes.
        ///
        /// Numbering follows Chromium's `net_error_list.h`; codes at or
        /// below -10000 are local to this crate.
        #[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
        pub enum NetError {
            $( $(#[$doc])* #[error($msg)] $variant, )*
            #[error("Unknown error: {0}")]
            Unknown(i32),
        }

        impl NetError {
            pub fn as_i32(&self) -> i32 {
                match self {
                    $( NetError::$variant => $code, )*
                    NetError::Unknown(code) => *code,
                }
            }
        }

        impl From<i32> for NetError {
            fn from(code: i32) -> Self {
                match code {
                    $( $code => NetError::$variant, )*
                    _ => NetError::Unknown(code),
                }
            }
        }
    };
}

net_errors! {
    /// Peer closed the connection (FIN) before the exchange finished.
    ConnectionClosed = -100 => "Connection closed (TCP FIN)",
    ConnectionReset = -101 => "Connection reset (TCP RST)",
    ConnectionRefused = -102 => "Connection refused",
    ConnectionAborted = -103 => "Connection aborted",
    ConnectionFailed = -104 => "Connection failed",
    NameNotResolved = -105 => "Name not resolved",
    SslProtocolError = -107 => "SSL protocol error",
    AddressUnreachable = -109 => "Address unreachable",
    /// The proxy refused the CONNECT request.
    TunnelConnectionFailed = -111 => "Tunnel connection failed",
    ConnectionTimedOut = -118 => "Connection timed out",
    ProxyConnectionFailed = -130 => "Proxy connection failed",
    /// No connection slot became free within the socket timeout.
    PreconnectMaxSocketLimit = -133 => "Socket limit reached",
    NetworkAccessDenied = -138 => "Network access denied",
    AddressInUse = -147 => "Address in use",

    InvalidUrl = -300 => "Invalid URL",
    UnknownUrlScheme = -302 => "Unknown URL scheme",
    InvalidRedirect = -303 => "Invalid redirect",
    TooManyRedirects = -310 => "Too many redirects",
    /// The server closed the connection without sending a response.
    EmptyResponse = -324 => "Empty response",
    ContentDecodingFailed = -330 => "Content decoding failed",
    InvalidHttpResponse = -370 => "Invalid HTTP response",

    InvalidHeader = -10001 => "Invalid header",
    HttpBodyError = -10002 => "Error reading response body",
}

impl From<io::Error> for NetError {
    fn from(err: io::Error) -> Self {
        use io::ErrorKind::*;
        match err.kind() {
            ConnectionRefused => NetError::ConnectionRefused,
            ConnectionReset => NetError::ConnectionReset,
            ConnectionAborted => NetError::ConnectionAborted,
            NotConnected | BrokenPipe | UnexpectedEof => NetError::ConnectionClosed,
            TimedOut => NetError::ConnectionTimedOut,
            AddrInUse => NetError::AddressInUse,
            AddrNotAvailable => NetError::AddressUnreachable,
            PermissionDenied => NetError::NetworkAccessDenied,
            // Raised by the gzip decoder.
            InvalidData => NetError::ContentDecodingFailed,
            _ => NetError::ConnectionFailed,
        }
    }
}
