//! Run-scope locking: a system-wide run excludes every owner run, owner runs exclude each other
//! only when they share an owner.

use crate::domain::OwnerId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Held for the duration of a run; dropping it releases the scope.
#[derive(Debug)]
pub enum RunGuard {
    System { _scope: OwnedRwLockWriteGuard<()> },
    Owner {
        _scope: OwnedRwLockReadGuard<()>,
        _owner: OwnedMutexGuard<()>,
    },
}

#[derive(Debug, Default)]
pub struct OwnerLocks {
    scope: Arc<RwLock<()>>,
    owners: Mutex<HashMap<OwnerId, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn system(&self) -> RunGuard {
        RunGuard::System {
            _scope: self.scope.clone().write_owned().await,
        }
    }

    pub async fn owner(&self, owner: &OwnerId) -> RunGuard {
        let scope = self.scope.clone().read_owned().await;
        let owner_lock = {
            let mut owners = self.owners.lock().await;
            // Only the map holds an idle owner's mutex.
            owners.retain(|_, lock| Arc::strong_count(lock) > 1);
            owners.entry(owner.clone()).or_default().clone()
        };
        RunGuard::Owner {
            _scope: scope,
            _owner: owner_lock.lock_owned().await,
        }
    }

    #[cfg(test)]
    async fn tracked_owners(&self) -> usize {
        self.owners.lock().await.len()
    }
}
