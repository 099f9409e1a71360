//! Tracking statements.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use vetted_types::{IdentityId, ProofFact, Timestamp};

use crate::StoreError;

/// A caller's prior signed snapshot of a target: the keys and proofs it saw
/// when it decided to trust the target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub tracker: IdentityId,
    pub target: IdentityId,
    pub tracked_at: Timestamp,
    /// Key ids that were live at tracking time.
    pub key_kids: Vec<String>,
    /// Proofs as observed at tracking time.
    pub proofs: Vec<ProofFact>,
}

impl TrackRecord {
    pub fn new(tracker: IdentityId, target: IdentityId, tracked_at: Timestamp) -> Self {
        Self {
            tracker,
            target,
            tracked_at,
            key_kids: Vec::new(),
            proofs: Vec::new(),
        }
    }

    pub fn with_key(mut self, kid: impl Into<String>) -> Self {
        self.key_kids.push(kid.into());
        self
    }

    pub fn with_proof(mut self, fact: ProofFact) -> Self {
        self.proofs.push(fact);
        self
    }
}

/// Lookup and insert of tracking statements keyed by `(tracker, target)`.
pub trait TrackStore: Send + Sync {
    fn lookup(
        &self,
        tracker: IdentityId,
        target: IdentityId,
    ) -> BoxFuture<'_, Result<Option<TrackRecord>, StoreError>>;

    fn insert(&self, record: TrackRecord) -> BoxFuture<'_, Result<(), StoreError>>;
}
