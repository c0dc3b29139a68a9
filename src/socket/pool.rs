use crate::base::neterror::NetError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Identifies a connection group (scheme, host, port).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupId {
    scheme: String,
    host: String,
    port: u16,
}

impl GroupId {
    pub fn from_url(url: &Url) -> Option<Self> {
        Some(GroupId {
            scheme: url.scheme().to_string(),
            host: url.host_str()?.to_ascii_lowercase(),
            port: url.port_or_known_default()?,
        })
    }
}

/// Caps concurrent connections per route and in total.
///
/// A connection holds one permit of each kind from the moment it is
/// requested until its response body is dropped.
pub struct ConnectionLimiter {
    max_per_group: usize,
    groups: DashMap<GroupId, Arc<Semaphore>>,
    total: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl std::fmt::Debug for ConnectionLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLimiter")
            .field("max_per_group", &self.max_per_group)
            .field("available_total", &self.total.available_permits())
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl ConnectionLimiter {
    pub fn new(max_per_group: usize, max_total: usize, acquire_timeout: Duration) -> Self {
        Self {
            max_per_group,
            groups: DashMap::new(),
            total: Arc::new(Semaphore::new(max_total)),
            acquire_timeout,
        }
    }

    /// Wait for a connection slot towards `url`.
    ///
    /// Fails with `PreconnectMaxSocketLimit` when no slot frees up within the
    /// acquire timeout.
    pub async fn acquire(&self, url: &Url) -> Result<ConnectionPermit, NetError> {
        let group_id = GroupId::from_url(url).ok_or(NetError::InvalidUrl)?;
        self.cleanup_idle_groups();
        let group = self
            .groups
            .entry(group_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.max_per_group)))
            .clone();
        let total = Arc::clone(&self.total);

        let acquire = async move {
            // Route first so one busy host cannot drain the global budget.
            let group = group.acquire_owned().await.ok()?;
            let total = total.acquire_owned().await.ok()?;
            Some((group, total))
        };

        match tokio::time::timeout(self.acquire_timeout, acquire).await {
            Ok(Some((group, total))) => Ok(ConnectionPermit {
                group_id,
                _group: group,
                _total: total,
            }),
            Ok(None) => Err(NetError::ConnectionAborted),
            Err(_) => {
                tracing::debug!(group = ?group_id, "timed out waiting for a connection slot");
                Err(NetError::PreconnectMaxSocketLimit)
            }
        }
    }

    /// Forget routes with no open connection and nobody waiting on them.
    pub fn cleanup_idle_groups(&self) {
        let max = self.max_per_group;
        self.groups.retain(|_, group| {
            Arc::strong_count(group) > 1 || group.available_permits() != max
        });
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn available_total(&self) -> usize {
        self.total.available_permits()
    }

    pub fn available_for(&self, url: &Url) -> usize {
        GroupId::from_url(url)
            .and_then(|id| self.groups.get(&id).map(|s| s.available_permits()))
            .unwrap_or(self.max_per_group)
    }
}

/// Slot held by one connection. Released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    group_id: GroupId,
    _group: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

impl ConnectionPermit {
    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }
}
