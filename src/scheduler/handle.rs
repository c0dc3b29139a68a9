//! Cancellable token for one scheduled request.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const COMPLETED: u8 = 2;
const CANCELLED: u8 = 3;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct HandleInner {
    id: u64,
    state: AtomicU8,
    /// Set by a forced cancel; pending I/O is abandoned.
    forced: AtomicBool,
    interrupt: Notify,
    finished: AtomicBool,
    done: Notify,
}

/// Handle to an in-flight request.
///
/// Clones share state. The worker running the request holds one clone,
/// the caller another; the owner registry only keeps a [`WeakHandle`].
#[derive(Debug, Clone)]
pub struct RequestHandle {
    inner: Arc<HandleInner>,
}

impl Default for RequestHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                state: AtomicU8::new(PENDING),
                forced: AtomicBool::new(false),
                interrupt: Notify::new(),
                finished: AtomicBool::new(false),
                done: Notify::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Request cancellation.
    ///
    /// The worker notices at its next safe point (before connecting, before
    /// each body read). With `force_interrupt` a pending connect or read is
    /// abandoned immediately. Returns false when the request had already
    /// completed or been cancelled.
    pub fn cancel(&self, force_interrupt: bool) -> bool {
        let cancelled = [PENDING, RUNNING].into_iter().any(|from| {
            self.inner
                .state
                .compare_exchange(from, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        });
        if !cancelled {
            return false;
        }
        if force_interrupt {
            self.inner.forced.store(true, Ordering::Release);
            self.inner.interrupt.notify_waiters();
        }
        tracing::debug!(request = self.inner.id, force_interrupt, "request cancelled");
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CANCELLED
    }

    /// True once the request completed or was cancelled.
    pub fn is_done(&self) -> bool {
        matches!(self.inner.state.load(Ordering::Acquire), COMPLETED | CANCELLED)
    }

    /// Wait until the worker has emitted its last event.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.finished.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }

    pub fn downgrade(&self) -> WeakHandle {
        WeakHandle(Arc::downgrade(&self.inner))
    }

    /// Pending -> running. False when cancelled before the worker started.
    pub(crate) fn start(&self) -> bool {
        self.inner
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Running -> completed; later cancels become no-ops.
    pub(crate) fn complete(&self) {
        let _ = self.inner.state.compare_exchange(
            RUNNING,
            COMPLETED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Mark the worker as gone and wake `wait()`ers.
    pub(crate) fn finish(&self) {
        self.inner.finished.store(true, Ordering::Release);
        self.inner.done.notify_waiters();
    }

    /// Run `fut` unless a forced cancel arrives first.
    pub(crate) async fn interruptible<F: Future>(&self, fut: F) -> Option<F::Output> {
        let interrupted = self.inner.interrupt.notified();
        tokio::pin!(interrupted);
        interrupted.as_mut().enable();
        if self.inner.forced.load(Ordering::Acquire) {
            return None;
        }
        tokio::select! {
            biased;
            _ = interrupted => None,
            out = fut => Some(out),
        }
    }
}

/// Non-owning reference to a [`RequestHandle`].
#[derive(Debug, Clone)]
pub struct WeakHandle(Weak<HandleInner>);

impl WeakHandle {
    pub fn upgrade(&self) -> Option<RequestHandle> {
        self.0.upgrade().map(|inner| RequestHandle { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}
