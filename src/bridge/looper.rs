//! Callback loops: per-thread FIFO queues that run handler callbacks.
//!
//! A thread that wants callbacks delivered to it owns a [`CallbackLoop`],
//! enters it, and pumps it. Requests submitted while the loop is entered
//! capture its [`CallbackContext`] and post their events there.

use crate::dispatch::event::ResponseEvent;
use crate::dispatch::handler::ResponseHandler;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<CallbackContext>> = const { RefCell::new(None) };
}

pub(crate) struct Envelope {
    handler: Arc<dyn ResponseHandler>,
    event: ResponseEvent,
}

/// Sending side of a [`CallbackLoop`].
#[derive(Clone)]
pub struct CallbackContext {
    id: u64,
    tx: mpsc::UnboundedSender<Envelope>,
}

impl fmt::Debug for CallbackContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackContext")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl CallbackContext {
    /// The context entered on this thread, if any.
    pub fn current() -> Option<CallbackContext> {
        CURRENT.with(|current| current.borrow().clone())
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// False once the loop was dropped or quit.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue `event` for `handler` on the loop. Dropped when the loop is dead.
    pub(crate) fn deliver(&self, handler: Arc<dyn ResponseHandler>, event: ResponseEvent) -> bool {
        let name = event.name();
        if self.tx.send(Envelope { handler, event }).is_err() {
            tracing::trace!(context = self.id, event = name, "callback context gone, event dropped");
            return false;
        }
        true
    }
}

/// Single-consumer callback queue, pumped by the thread that owns it.
pub struct CallbackLoop {
    context: CallbackContext,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl fmt::Debug for CallbackLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackLoop")
            .field("id", &self.context.id)
            .finish()
    }
}

impl Default for CallbackLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            context: CallbackContext {
                id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
                tx,
            },
            rx,
        }
    }

    pub fn context(&self) -> CallbackContext {
        self.context.clone()
    }

    /// Make this loop the current context of the calling thread until the
    /// guard is dropped.
    pub fn enter(&self) -> ContextGuard {
        let previous = CURRENT.with(|current| current.replace(Some(self.context.clone())));
        ContextGuard {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Wait for one event and run its callback. Returns false once the loop
    /// has quit and drained.
    pub async fn turn(&mut self) -> bool {
        match self.rx.recv().await {
            Some(envelope) => {
                run(envelope);
                true
            }
            None => false,
        }
    }

    /// Blocking [`turn`](Self::turn) for threads outside any runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_turn(&mut self) -> bool {
        match self.rx.blocking_recv() {
            Some(envelope) => {
                run(envelope);
                true
            }
            None => false,
        }
    }

    /// Run every callback already queued without waiting. Returns how many
    /// ran.
    pub fn pump(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            run(envelope);
            ran += 1;
        }
        ran
    }

    /// Stop accepting events. Already queued events can still be pumped;
    /// later posts are dropped.
    pub fn quit(&mut self) {
        self.rx.close();
    }
}

fn run(envelope: Envelope) {
    envelope.event.dispatch(&*envelope.handler);
}

/// Restores the previous current context on drop.
pub struct ContextGuard {
    previous: Option<CallbackContext>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Names(Mutex<Vec<&'static str>>);

    impl ResponseHandler for Names {
        fn on_start(&self) {
            self.0.lock().unwrap().push("start");
        }
        fn on_finish(&self) {
            self.0.lock().unwrap().push("finish");
        }
    }

    #[test]
    fn test_enter_sets_and_restores_current() {
        assert!(CallbackContext::current().is_none());
        let outer = CallbackLoop::new();
        let inner = CallbackLoop::new();
        {
            let _g = outer.enter();
            assert_eq!(CallbackContext::current().unwrap().id(), outer.context().id());
            {
                let _g = inner.enter();
                assert_eq!(CallbackContext::current().unwrap().id(), inner.context().id());
            }
            assert_eq!(CallbackContext::current().unwrap().id(), outer.context().id());
        }
        assert!(CallbackContext::current().is_none());
    }

    #[test]
    fn test_pump_runs_in_post_order() {
        let mut looper = CallbackLoop::new();
        let names = Arc::new(Names::default());
        let ctx = looper.context();
        assert!(ctx.deliver(names.clone(), ResponseEvent::Start));
        assert!(ctx.deliver(names.clone(), ResponseEvent::Finish));
        assert!(names.0.lock().unwrap().is_empty());

        assert_eq!(looper.pump(), 2);
        assert_eq!(*names.0.lock().unwrap(), vec!["start", "finish"]);
        assert_eq!(looper.pump(), 0);
    }

    #[test]
    fn test_dead_context_drops_events() {
        let looper = CallbackLoop::new();
        let ctx = looper.context();
        drop(looper);
        assert!(!ctx.is_alive());
        let names = Arc::new(Names::default());
        assert!(!ctx.deliver(names.clone(), ResponseEvent::Start));
        assert!(names.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_quit_drains_then_stops() {
        let mut looper = CallbackLoop::new();
        let ctx = looper.context();
        let names = Arc::new(Names::default());
        ctx.deliver(names.clone(), ResponseEvent::Start);
        looper.quit();
        assert!(!ctx.deliver(names.clone(), ResponseEvent::Finish));
        assert!(looper.blocking_turn());
        assert!(!looper.blocking_turn());
        assert_eq!(*names.0.lock().unwrap(), vec!["start"]);
    }

    #[tokio::test]
    async fn test_turn_waits_for_event() {
        let mut looper = CallbackLoop::new();
        let ctx = looper.context();
        let names = Arc::new(Names::default());
        let worker_names = names.clone();
        tokio::spawn(async move {
            ctx.deliver(worker_names, ResponseEvent::Start);
        });
        assert!(looper.turn().await);
        assert_eq!(*names.0.lock().unwrap(), vec!["start"]);
    }
}
