use crate::base::error::HttpError;
use crate::dispatch::handler::ResponseHandler;
use bytes::Bytes;

/// One ordered unit of request-lifecycle information.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEvent {
    Start,
    ReceiveStart {
        content_length: u64,
        charset: Option<String>,
    },
    ReceiveSegment(Bytes),
    ReceiveEnd,
    Success(Bytes),
    Failure {
        error: HttpError,
        body: Option<String>,
    },
    Finish,
}

impl ResponseEvent {
    /// Invoke the handler callback matching this event.
    pub fn dispatch(&self, handler: &dyn ResponseHandler) {
        match self {
            ResponseEvent::Start => handler.on_start(),
            ResponseEvent::ReceiveStart {
                content_length,
                charset,
            } => handler.on_receive_start(*content_length, charset.as_deref()),
            ResponseEvent::ReceiveSegment(segment) => handler.on_receive_segment(segment),
            ResponseEvent::ReceiveEnd => handler.on_receive_end(),
            ResponseEvent::Success(body) => handler.on_success(body),
            ResponseEvent::Failure { error, body } => handler.on_failure(error, body.as_deref()),
            ResponseEvent::Finish => handler.on_finish(),
        }
    }

    /// Success or Failure.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseEvent::Success(_) | ResponseEvent::Failure { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseEvent::Start => "start",
            ResponseEvent::ReceiveStart { .. } => "receive_start",
            ResponseEvent::ReceiveSegment(_) => "receive_segment",
            ResponseEvent::ReceiveEnd => "receive_end",
            ResponseEvent::Success(_) => "success",
            ResponseEvent::Failure { .. } => "failure",
            ResponseEvent::Finish => "finish",
        }
    }
}
