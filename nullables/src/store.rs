//! Nullable directory and tracking store: thread-safe in-memory collaborators.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;

use vetted_store::{StoreError, TrackRecord, TrackStore, UserLoader};
use vetted_types::{IdentityId, IdentitySnapshot};

/// An in-memory identity directory for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
pub struct NullDirectory {
    identities: Mutex<HashMap<IdentityId, IdentitySnapshot>>,
    self_id: Mutex<Option<IdentityId>>,
    failure: Mutex<Option<StoreError>>,
    loads: Mutex<HashMap<IdentityId, usize>>,
}

impl NullDirectory {
    pub fn new() -> Self {
        Self {
            identities: Mutex::new(HashMap::new()),
            self_id: Mutex::new(None),
            failure: Mutex::new(None),
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or replace an identity.
    pub fn insert(&self, snapshot: IdentitySnapshot) {
        self.identities.lock().unwrap().insert(snapshot.id, snapshot);
    }

    /// Log in as `id`.
    pub fn set_self(&self, id: IdentityId) {
        *self.self_id.lock().unwrap() = Some(id);
    }

    pub fn log_out(&self) {
        *self.self_id.lock().unwrap() = None;
    }

    /// Make every subsequent load fail with `err` (`None` to clear).
    pub fn fail_with(&self, err: Option<StoreError>) {
        *self.failure.lock().unwrap() = err;
    }

    /// Apply `f` to a stored identity, e.g. to bump its freshness marker.
    pub fn update(&self, id: IdentityId, f: impl FnOnce(&mut IdentitySnapshot)) {
        if let Some(snapshot) = self.identities.lock().unwrap().get_mut(&id) {
            f(snapshot);
        }
    }

    /// How many times `id` has been loaded, by id or as self.
    pub fn loads(&self, id: IdentityId) -> usize {
        self.loads.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    fn load(&self, id: IdentityId) -> Result<IdentitySnapshot, StoreError> {
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        *self.loads.lock().unwrap().entry(id).or_default() += 1;
        self.identities
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

impl Default for NullDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserLoader for NullDirectory {
    fn load_by_id(&self, id: IdentityId) -> BoxFuture<'_, Result<IdentitySnapshot, StoreError>> {
        Box::pin(async move { self.load(id) })
    }

    fn load_self(&self) -> BoxFuture<'_, Result<Option<IdentitySnapshot>, StoreError>> {
        Box::pin(async move {
            let self_id = *self.self_id.lock().unwrap();
            match self_id {
                Some(id) => self.load(id).map(Some),
                None => Ok(None),
            }
        })
    }
}

/// An in-memory tracking store for testing.
#[derive(Default)]
pub struct NullTrackStore {
    records: Mutex<HashMap<(IdentityId, IdentityId), TrackRecord>>,
}

impl NullTrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrackStore for NullTrackStore {
    fn lookup(
        &self,
        tracker: IdentityId,
        target: IdentityId,
    ) -> BoxFuture<'_, Result<Option<TrackRecord>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .unwrap()
                .get(&(tracker, target))
                .cloned())
        })
    }

    fn insert(&self, record: TrackRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.records
                .lock()
                .unwrap()
                .insert((record.tracker, record.target), record);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vetted_types::{FreshnessMarker, Timestamp};

    fn alice() -> IdentitySnapshot {
        IdentitySnapshot::new(IdentityId::new([1; 16]), "alice")
    }

    #[tokio::test]
    async fn directory_loads_and_counts() {
        let dir = NullDirectory::new();
        dir.insert(alice());
        let loaded = dir.load_by_id(alice().id).await.unwrap();
        assert_eq!(loaded.name, "alice");
        assert_eq!(dir.loads(alice().id), 1);

        let missing = IdentityId::new([2; 16]);
        assert_eq!(dir.load_by_id(missing).await, Err(StoreError::NotFound(missing)));
    }

    #[tokio::test]
    async fn self_is_none_when_logged_out() {
        let dir = NullDirectory::new();
        dir.insert(alice());
        assert_eq!(dir.load_self().await.unwrap(), None);
        dir.set_self(alice().id);
        assert!(dir.load_self().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn update_and_failure_injection() {
        let dir = NullDirectory::new();
        dir.insert(alice());
        dir.update(alice().id, |s| s.freshness = FreshnessMarker::new(9, 0));
        assert_eq!(dir.load_by_id(alice().id).await.unwrap().freshness.sigchain_seqno, 9);

        dir.fail_with(Some(StoreError::Backend("down".into())));
        assert!(dir.load_by_id(alice().id).await.is_err());
    }

    #[tokio::test]
    async fn track_store_round_trip() {
        let store = NullTrackStore::new();
        let me = IdentityId::new([1; 16]);
        let them = IdentityId::new([2; 16]);
        assert!(store.lookup(me, them).await.unwrap().is_none());
        store
            .insert(TrackRecord::new(me, them, Timestamp::new(5)))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.lookup(me, them).await.unwrap().is_some());
        assert!(store.lookup(them, me).await.unwrap().is_none());
    }
}
