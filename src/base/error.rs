//! Errors reported to response handlers.

use crate::base::neterror::NetError;
use http::StatusCode;
use thiserror::Error;

/// The error carried by a failure event.
///
/// Separates the three ways a request can fail from the caller's point of
/// view: the transport broke, the server answered with a non-success status,
/// or the caller cancelled the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Connect, read, or protocol failure below HTTP semantics.
    #[error(transparent)]
    Net(#[from] NetError),

    /// The server answered with a status code of 300 or above.
    #[error("http error-statusCode:{},responseBody:{}", .status.as_u16(), .body)]
    Status { status: StatusCode, body: String },

    /// The request was cancelled before it completed.
    #[error("request interrupted")]
    Interrupted,

    /// The declared content length cannot be represented in memory.
    #[error("HTTP entity too large to be buffered in memory ({0} bytes)")]
    EntityTooLarge(u64),
}

impl HttpError {
    /// True when the request was stopped by a cancel call.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, HttpError::Interrupted)
    }

    /// The HTTP status code, for protocol errors.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server-provided body, for protocol errors.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            HttpError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::Net(NetError::from(err))
    }
}
