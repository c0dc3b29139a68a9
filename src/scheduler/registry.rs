//! Owner registry: weak per-owner tracking of in-flight requests.
//!
//! Neither side of the mapping is kept alive by the registry. An owner that
//! is dropped disappears on the next sweep; handles are reclaimed as soon as
//! the caller and the worker let go of them.

use crate::scheduler::handle::{RequestHandle, WeakHandle};
use dashmap::DashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct OwnerToken {
    id: u64,
}

/// Opaque key for a caller-defined lifecycle scope, such as a screen.
///
/// Clones are the same owner. Requests tagged with an owner can be
/// cancelled together through `cancel_all`.
#[derive(Clone)]
pub struct Owner {
    token: Arc<OwnerToken>,
}

impl Owner {
    pub fn new() -> Self {
        Self {
            token: Arc::new(OwnerToken {
                id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.token.id
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Owner").field(&self.token.id).finish()
    }
}

impl PartialEq for Owner {
    fn eq(&self, other: &Self) -> bool {
        self.token.id == other.token.id
    }
}

impl Eq for Owner {}

impl Hash for Owner {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token.id.hash(state);
    }
}

struct OwnerEntry {
    owner: Weak<OwnerToken>,
    handles: Vec<WeakHandle>,
}

#[derive(Default)]
pub struct OwnerRegistry {
    entries: DashMap<u64, OwnerEntry>,
}

impl fmt::Debug for OwnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnerRegistry")
            .field("owners", &self.entries.len())
            .finish()
    }
}

impl OwnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `handle` under `owner`, after the owner's earlier handles.
    pub fn register(&self, owner: &Owner, handle: &RequestHandle) {
        self.sweep();
        self.entries
            .entry(owner.id())
            .or_insert_with(|| OwnerEntry {
                owner: Arc::downgrade(&owner.token),
                handles: Vec::new(),
            })
            .handles
            .push(handle.downgrade());
    }

    /// Cancel every live handle under `owner` and forget the owner.
    ///
    /// Returns how many handles were actually cancelled; handles that were
    /// reclaimed or had already finished are skipped.
    pub fn cancel_all(&self, owner: &Owner, force_interrupt: bool) -> usize {
        let Some((_, entry)) = self.entries.remove(&owner.id()) else {
            return 0;
        };
        let cancelled = entry
            .handles
            .iter()
            .filter_map(WeakHandle::upgrade)
            .filter(|handle| handle.cancel(force_interrupt))
            .count();
        tracing::debug!(
            owner = owner.id(),
            tracked = entry.handles.len(),
            cancelled,
            "cancelled requests for owner"
        );
        cancelled
    }

    /// Number of owners still alive.
    pub fn owner_count(&self) -> usize {
        self.sweep();
        self.entries.len()
    }

    /// Handle references recorded under `owner`, reclaimed ones included.
    pub fn tracked_handles(&self, owner: &Owner) -> usize {
        self.entries
            .get(&owner.id())
            .map(|entry| entry.handles.len())
            .unwrap_or(0)
    }

    /// Handles under `owner` that are still referenced somewhere.
    pub fn live_handles(&self, owner: &Owner) -> Vec<RequestHandle> {
        self.entries
            .get(&owner.id())
            .map(|entry| entry.handles.iter().filter_map(WeakHandle::upgrade).collect())
            .unwrap_or_default()
    }

    fn sweep(&self) {
        self.entries.retain(|_, entry| entry.owner.strong_count() > 0);
    }
}
