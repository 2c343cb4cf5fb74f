//! Per-repository leases
//!
//! Publications against the same repository are serialised inside one
//! process. Different repositories never wait on each other.

use metamorph_core::RepoId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Held while publishing to one repository; released on drop
#[derive(Debug)]
pub struct RepositoryLease {
    repo: RepoId,
    _guard: OwnedMutexGuard<()>,
}

impl RepositoryLease {
    pub fn repository(&self) -> &RepoId {
        &self.repo
    }
}

/// Lease table keyed by repository
#[derive(Debug, Clone, Default)]
pub struct RepositoryLeases {
    locks: Arc<Mutex<HashMap<RepoId, Arc<AsyncMutex<()>>>>>,
}

impl RepositoryLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and take the lease on `repo`
    pub async fn acquire(&self, repo: &RepoId) -> RepositoryLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(repo.clone()).or_default().clone()
        };

        debug!("Waiting for lease on {}", repo);
        let guard = lock.lock_owned().await;
        debug!("Acquired lease on {}", repo);

        RepositoryLease {
            repo: repo.clone(),
            _guard: guard,
        }
    }

    /// Number of repositories currently leased or awaited
    pub fn active(&self) -> usize {
        let locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
