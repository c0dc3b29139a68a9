//! Turns a transport response into lifecycle events.

use crate::base::error::HttpError;
use crate::bridge::CallbackBridge;
use crate::config::{DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_LENGTH};
use crate::dispatch::event::ResponseEvent;
use crate::http::transport::{BodyReader, PreparedRequest, Transport, TransportResponse};
use crate::scheduler::handle::RequestHandle;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Cap on the up-front reservation for the aggregated body.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Largest error body read for a status failure.
const MAX_ERROR_BODY: u64 = 64 * 1024;

type Failure = (HttpError, Option<String>);

/// Drives one request through the transport and reports it as events.
///
/// Every run emits `Start` first and `Finish` last, with exactly one
/// `Success` or `Failure` in between.
pub struct ResponseDispatcher {
    transport: Arc<dyn Transport>,
    chunk_size: usize,
    default_content_length: u64,
}

impl std::fmt::Debug for ResponseDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseDispatcher")
            .field("chunk_size", &self.chunk_size)
            .field("default_content_length", &self.default_content_length)
            .finish_non_exhaustive()
    }
}

impl ResponseDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_content_length: DEFAULT_CONTENT_LENGTH,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_default_content_length(mut self, length: u64) -> Self {
        self.default_content_length = length;
        self
    }

    pub async fn run(&self, request: &PreparedRequest, handle: &RequestHandle, bridge: &CallbackBridge) {
        tracing::debug!(request = handle.id(), method = %request.method, url = %request.url, "dispatch started");
        bridge.post(ResponseEvent::Start);

        let outcome = self.drive(request, handle, bridge).await;
        if let Err((error, body)) = outcome {
            tracing::debug!(request = handle.id(), error = %error, "request failed");
            bridge.post(ResponseEvent::Failure { error, body });
        }

        // Cancels after this point are no-ops.
        handle.complete();
        bridge.post(ResponseEvent::Finish);
        tracing::debug!(request = handle.id(), "dispatch finished");
    }

    async fn drive(
        &self,
        request: &PreparedRequest,
        handle: &RequestHandle,
        bridge: &CallbackBridge,
    ) -> Result<(), Failure> {
        if handle.is_cancelled() {
            return Err(interrupted());
        }
        let mut response = handle
            .interruptible(self.transport.execute(request))
            .await
            .ok_or_else(interrupted)?
            .map_err(|e| (HttpError::Net(e), None))?;

        let status = response.status();
        if status.as_u16() >= 300 {
            let body = read_error_body(&mut response, handle).await?;
            let body = if body.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                body
            };
            return Err((
                HttpError::Status {
                    status,
                    body: body.clone(),
                },
                Some(body),
            ));
        }

        let Some(reader) = response.take_body() else {
            bridge.post(ResponseEvent::ReceiveStart {
                content_length: 0,
                charset: None,
            });
            bridge.post(ResponseEvent::ReceiveSegment(Bytes::new()));
            bridge.post(ResponseEvent::ReceiveEnd);
            bridge.post(ResponseEvent::Success(Bytes::new()));
            return Ok(());
        };

        let declared = response.content_length().unwrap_or(0);
        if declared > isize::MAX as u64 {
            return Err((HttpError::EntityTooLarge(declared), None));
        }
        let content_length = if declared == 0 {
            self.default_content_length
        } else {
            declared
        };
        bridge.post(ResponseEvent::ReceiveStart {
            content_length,
            charset: response.charset(),
        });

        let buffer = bridge.handler().buffer_body();
        let body = self.stream_body(reader, content_length, buffer, handle, bridge).await?;

        bridge.post(ResponseEvent::ReceiveEnd);
        bridge.post(ResponseEvent::Success(body));
        Ok(())
    }

    async fn stream_body(
        &self,
        mut reader: BodyReader,
        content_length: u64,
        buffer: bool,
        handle: &RequestHandle,
        bridge: &CallbackBridge,
    ) -> Result<Bytes, Failure> {
        let mut aggregate = if buffer {
            BytesMut::with_capacity(content_length.min(MAX_PREALLOCATION) as usize)
        } else {
            BytesMut::new()
        };

        loop {
            let mut chunk = vec![0u8; self.chunk_size];
            let mut filled = 0;
            while filled < chunk.len() {
                if handle.is_cancelled() {
                    return Err(interrupted());
                }
                let n = handle
                    .interruptible(reader.read(&mut chunk[filled..]))
                    .await
                    .ok_or_else(interrupted)?
                    .map_err(|e| (HttpError::from(e), None))?;
                if n == 0 {
                    break;
                }
                filled += n;
            }

            if filled == 0 {
                break;
            }
            let exhausted = filled < chunk.len();
            chunk.truncate(filled);
            let segment = Bytes::from(chunk);
            if buffer {
                aggregate.extend_from_slice(&segment);
            }
            tracing::trace!(request = handle.id(), len = segment.len(), "segment");
            bridge.post(ResponseEvent::ReceiveSegment(segment));

            if exhausted {
                break;
            }
        }

        // Release the connection before ReceiveEnd goes out.
        drop(reader);
        Ok(aggregate.freeze())
    }
}

/// Read what the server sent with an error status, lossily decoded.
async fn read_error_body(
    response: &mut TransportResponse,
    handle: &RequestHandle,
) -> Result<String, Failure> {
    let Some(reader) = response.take_body() else {
        return Ok(String::new());
    };
    let mut raw = Vec::new();
    handle
        .interruptible(reader.take(MAX_ERROR_BODY).read_to_end(&mut raw))
        .await
        .ok_or_else(interrupted)?
        .map_err(|e| (HttpError::from(e), None))?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn interrupted() -> Failure {
    (HttpError::Interrupted, None)
}
