//! Single-flight locks keyed by identity.
//!
//! At most one verification run per identity holds its lock at a time. Locks
//! are created on first use and removed once the last holder or waiter lets
//! go, so the table only ever contains identities with runs in flight.
//!
//! A [`NamedLockGuard`] is an owned value: moving it into a spawned task
//! hands the lock over to that task instead of releasing it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OwnedMutexGuard;

use vetted_types::IdentityId;

struct Entry {
    /// Holders plus waiters.
    refs: usize,
    lock: Arc<tokio::sync::Mutex<()>>,
}

type Table = Arc<Mutex<HashMap<IdentityId, Entry>>>;

fn lock_map(table: &Table) -> MutexGuard<'_, HashMap<IdentityId, Entry>> {
    // The map is consistent after every statement, so a poisoned lock is
    // still safe to use.
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of per-identity locks with reference counting.
#[derive(Clone, Default)]
pub struct SingleFlightLockTable {
    table: Table,
}

impl SingleFlightLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive ownership of `id`.
    ///
    /// Cancellation safe: dropping the returned future before it resolves
    /// gives up the waiter's reference.
    pub async fn acquire(&self, id: IdentityId) -> NamedLockGuard {
        let lock = {
            let mut map = lock_map(&self.table);
            let entry = map.entry(id).or_insert_with(|| Entry {
                refs: 0,
                lock: Arc::new(tokio::sync::Mutex::new(())),
            });
            entry.refs += 1;
            entry.lock.clone()
        };
        let reference = TableRef {
            id,
            table: self.table.clone(),
        };
        let guard = lock.lock_owned().await;
        NamedLockGuard {
            guard: Some(guard),
            reference,
        }
    }

    /// Number of identities with a holder or waiter.
    pub fn len(&self) -> usize {
        lock_map(&self.table).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Holders plus waiters for `id`.
    pub fn refs(&self, id: IdentityId) -> usize {
        lock_map(&self.table).get(&id).map_or(0, |e| e.refs)
    }
}

/// One counted reference to a table entry.
struct TableRef {
    id: IdentityId,
    table: Table,
}

impl Drop for TableRef {
    fn drop(&mut self) {
        let mut map = lock_map(&self.table);
        if let Some(entry) = map.get_mut(&self.id) {
            entry.refs -= 1;
            if entry.refs == 0 {
                map.remove(&self.id);
            }
        }
    }
}

/// Exclusive ownership of one identity's lock. Released on drop.
pub struct NamedLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    reference: TableRef,
}

impl NamedLockGuard {
    pub fn id(&self) -> IdentityId {
        self.reference.id
    }
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        // Unlock before the reference count drops, so a zero count always
        // means nobody holds the mutex.
        self.guard.take();
    }
}

impl std::fmt::Debug for NamedLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedLockGuard").field("id", &self.id()).finish()
    }
}
