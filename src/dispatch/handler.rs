use crate::base::error::HttpError;
use bytes::Bytes;

/// Receives the lifecycle callbacks of one request.
///
/// Every method has a no-op default, so implementations override only what
/// they need. Callbacks run on the originating callback loop when there is
/// one, otherwise directly on the worker.
///
/// Order per request: `on_start`, then either the receive sequence
/// (`on_receive_start`, `on_receive_segment`*, `on_receive_end`) followed by
/// `on_success`, or `on_failure`; `on_finish` always comes last.
pub trait ResponseHandler: Send + Sync + 'static {
    fn on_start(&self) {}

    /// `content_length` is the declared length, or the configured default
    /// when the server sent none.
    fn on_receive_start(&self, _content_length: u64, _charset: Option<&str>) {}

    fn on_receive_segment(&self, _segment: &Bytes) {}

    fn on_receive_end(&self) {}

    /// `body` holds every segment, or is empty when [`buffer_body`] is false.
    ///
    /// [`buffer_body`]: ResponseHandler::buffer_body
    fn on_success(&self, _body: &Bytes) {}

    fn on_failure(&self, _error: &HttpError, _body: Option<&str>) {}

    fn on_finish(&self) {}

    /// Whether the dispatcher should aggregate segments for `on_success`.
    fn buffer_body(&self) -> bool {
        true
    }
}
