//! Per-user mutual exclusion
//!
//! Ledger read-modify-persist cycles, order edits and order settlement for
//! one user all run under that user's lock. Different users never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use types::ids::UserId;

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`'s records.
    pub async fn lock(&self, user_id: UserId) -> UserGuard {
        // Clone the Arc out so the shard lock is not held across the await
        let mutex = self.locks.entry(user_id).or_default().clone();
        UserGuard {
            user_id,
            _guard: mutex.lock_owned().await,
        }
    }
}

/// Proof that the holder owns the user's lock. Dropping it unlocks.
#[derive(Debug)]
pub struct UserGuard {
    user_id: UserId,
    _guard: OwnedMutexGuard<()>,
}

impl UserGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
