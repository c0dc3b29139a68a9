//! Relocates response events from the worker to the originating context.

pub mod looper;

use crate::dispatch::event::ResponseEvent;
use crate::dispatch::handler::ResponseHandler;
use std::sync::Arc;

pub use looper::{CallbackContext, CallbackLoop, ContextGuard};

/// Delivers one request's events to its handler.
///
/// With a target context, events are queued onto that loop in post order
/// (and silently dropped once the loop is gone). Without one, callbacks run
/// immediately on the posting thread.
#[derive(Clone)]
pub struct CallbackBridge {
    handler: Arc<dyn ResponseHandler>,
    target: Option<CallbackContext>,
}

impl std::fmt::Debug for CallbackBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackBridge")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl CallbackBridge {
    /// Bridge to the context current on the calling thread, if any.
    pub fn capture(handler: Arc<dyn ResponseHandler>) -> Self {
        Self::with_context(handler, CallbackContext::current())
    }

    pub fn with_context(handler: Arc<dyn ResponseHandler>, target: Option<CallbackContext>) -> Self {
        Self { handler, target }
    }

    /// Bridge that always calls the handler directly.
    pub fn direct(handler: Arc<dyn ResponseHandler>) -> Self {
        Self::with_context(handler, None)
    }

    pub fn handler(&self) -> &dyn ResponseHandler {
        &*self.handler
    }

    pub fn target(&self) -> Option<&CallbackContext> {
        self.target.as_ref()
    }

    pub fn post(&self, event: ResponseEvent) {
        match &self.target {
            Some(context) => {
                context.deliver(Arc::clone(&self.handler), event);
            }
            None => event.dispatch(&*self.handler),
        }
    }
}
