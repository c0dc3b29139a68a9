//! Worker pool for request dispatch.
//!
//! By default a dedicated multi-threaded tokio runtime is created on first
//! use. Its threads are named `asyncnet-worker-#N` and run one nice level
//! below normal on Linux/Android. The async workers live as long as the
//! runtime; only idle blocking-pool threads are reclaimed after
//! [`THREAD_KEEP_ALIVE`]. A caller-provided runtime handle can be used
//! instead.
//!
//! Every queued task keeps the owned runtime alive, so dropping the pool
//! never cuts a request short. The runtime shuts down once the pool and
//! all of its tasks are gone.

use crate::base::neterror::NetError;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

/// Idle blocking-pool threads are reclaimed after this long.
pub const THREAD_KEEP_ALIVE: Duration = Duration::from_secs(30);

pub const THREAD_NAME_PREFIX: &str = "asyncnet-worker-#";

/// Shuts the runtime down when the last reference goes away.
struct OwnedRuntime(Option<Runtime>);

impl OwnedRuntime {
    fn handle(&self) -> Result<Handle, NetError> {
        self.0
            .as_ref()
            .map(|rt| rt.handle().clone())
            .ok_or(NetError::ConnectionAborted)
    }
}

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        let Some(rt) = self.0.take() else {
            return;
        };
        if Handle::try_current().is_err() {
            rt.shutdown_background();
            return;
        }
        // The last reference may be released by one of the runtime's own
        // tasks; let another thread wait for the workers to wind down.
        let spawned = std::thread::Builder::new()
            .name("asyncnet-shutdown".to_string())
            .spawn(move || drop(rt));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start runtime shutdown thread");
        }
    }
}

enum PoolKind {
    Owned {
        runtime: OnceCell<Arc<OwnedRuntime>>,
        worker_threads: usize,
    },
    External(Handle),
}

pub struct WorkerPool {
    kind: PoolKind,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            PoolKind::Owned {
                runtime,
                worker_threads,
            } => f
                .debug_struct("WorkerPool")
                .field("worker_threads", worker_threads)
                .field("started", &runtime.get().is_some())
                .finish(),
            PoolKind::External(_) => f.debug_struct("WorkerPool").field("external", &true).finish(),
        }
    }
}

impl WorkerPool {
    /// Pool backed by its own runtime, created on first use.
    pub fn new(worker_threads: usize) -> Self {
        Self {
            kind: PoolKind::Owned {
                runtime: OnceCell::new(),
                worker_threads: worker_threads.max(1),
            },
        }
    }

    /// Pool that runs requests on an existing runtime.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            kind: PoolKind::External(handle),
        }
    }

    fn owned(
        runtime: &OnceCell<Arc<OwnedRuntime>>,
        worker_threads: usize,
    ) -> Result<&Arc<OwnedRuntime>, NetError> {
        runtime
            .get_or_try_init(|| {
                build_runtime(worker_threads).map(|rt| Arc::new(OwnedRuntime(Some(rt))))
            })
            .map_err(|e| {
                tracing::warn!(error = %e, "failed to start worker runtime");
                NetError::from(e)
            })
    }

    pub fn handle(&self) -> Result<Handle, NetError> {
        match &self.kind {
            PoolKind::Owned {
                runtime,
                worker_threads,
            } => Self::owned(runtime, *worker_threads)?.handle(),
            PoolKind::External(handle) => Ok(handle.clone()),
        }
    }

    /// Queue a unit of work. The queue is unbounded.
    pub fn spawn<F>(&self, work: F) -> Result<JoinHandle<()>, NetError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match &self.kind {
            PoolKind::Owned {
                runtime,
                worker_threads,
            } => {
                let owned = Arc::clone(Self::owned(runtime, *worker_threads)?);
                let handle = owned.handle()?;
                Ok(handle.spawn(async move {
                    let _runtime = owned;
                    work.await;
                }))
            }
            PoolKind::External(handle) => Ok(handle.spawn(work)),
        }
    }
}

fn build_runtime(worker_threads: usize) -> std::io::Result<Runtime> {
    let next_id = Arc::new(AtomicUsize::new(1));
    tracing::debug!(worker_threads, "starting worker runtime");
    Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .thread_name_fn(move || {
            format!("{}{}", THREAD_NAME_PREFIX, next_id.fetch_add(1, Ordering::Relaxed))
        })
        .thread_keep_alive(THREAD_KEEP_ALIVE)
        .on_thread_start(lower_priority)
        .enable_all()
        .build()
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn lower_priority() {
    // On Linux, who = 0 targets the calling thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, 1) };
    if rc != 0 {
        tracing::trace!("could not lower worker thread priority");
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn lower_priority() {}
