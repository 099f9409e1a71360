//! Two-tier verification cache.
//!
//! One record per identity, read through two independent freshness checks:
//!
//! - **fast**: `now - cached_at < fast_ttl`. Only for requests without any
//!   assertion; lets a repeat query skip even the single-flight lock.
//! - **slow**: `now - last_fully_identified_at < slow_ttl` *and* the cached
//!   snapshot's freshness marker dominates the identity's current one.
//!
//! Records are never mutated and never deleted. A successful run replaces
//! the record wholesale; an outdated record simply stops passing the checks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use vetted_types::{FreshnessMarker, IdentityId, IdentitySnapshot, Timestamp};

use crate::ProofBreak;

/// What the cache stores for one identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationRecord {
    pub snapshot: Arc<IdentitySnapshot>,
    pub cached_at: Timestamp,
    pub last_fully_identified_at: Timestamp,
    /// Proof failures tolerated by the run that produced this record.
    pub breaks: Vec<ProofBreak>,
}

impl VerificationRecord {
    pub fn new(snapshot: Arc<IdentitySnapshot>, identified_at: Timestamp) -> Self {
        Self {
            snapshot,
            cached_at: identified_at,
            last_fully_identified_at: identified_at,
            breaks: Vec::new(),
        }
    }

    pub fn with_breaks(mut self, breaks: Vec<ProofBreak>) -> Self {
        self.breaks = breaks;
        self
    }

    pub fn id(&self) -> IdentityId {
        self.snapshot.id
    }

    pub fn has_breaks(&self) -> bool {
        !self.breaks.is_empty()
    }
}

/// Per-tier lookup counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierStats {
    pub hits: u64,
    /// Record present but older than the tier's TTL.
    pub timeouts: u64,
    /// No record at all.
    pub misses: u64,
    /// Record recent enough but superseded by a newer sigchain.
    pub stale: u64,
    /// Record carries proof breaks the caller does not tolerate.
    pub broken: u64,
}

/// Why a lookup did not produce a usable record. Never leaves the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CacheMiss {
    Absent,
    Timeout,
    Stale,
    Broken,
}

impl TierStats {
    fn record(&mut self, outcome: Result<(), CacheMiss>) {
        let counter = match outcome {
            Ok(()) => &mut self.hits,
            Err(CacheMiss::Absent) => &mut self.misses,
            Err(CacheMiss::Timeout) => &mut self.timeouts,
            Err(CacheMiss::Stale) => &mut self.stale,
            Err(CacheMiss::Broken) => &mut self.broken,
        };
        *counter += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheTtls {
    pub fast_secs: u64,
    pub slow_secs: u64,
    /// Slow-tier TTL for records with breaks.
    pub broken_secs: u64,
}

/// Process-wide verification cache, safe for concurrent use.
pub struct VerificationCache {
    records: RwLock<HashMap<IdentityId, Arc<VerificationRecord>>>,
    fast_stats: Mutex<TierStats>,
    slow_stats: Mutex<TierStats>,
    ttls: CacheTtls,
}

impl VerificationCache {
    pub fn new(ttls: CacheTtls) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            fast_stats: Mutex::new(TierStats::default()),
            slow_stats: Mutex::new(TierStats::default()),
            ttls,
        }
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    /// Fast-tier lookup. Callers must only use this for requests without
    /// any assertion.
    pub fn fast_check(
        &self,
        id: IdentityId,
        now: Timestamp,
        tolerate_breaks: bool,
    ) -> Option<Arc<VerificationRecord>> {
        let outcome = self.fast_lookup(id, now, tolerate_breaks);
        self.count(&self.fast_stats, &outcome);
        outcome.ok()
    }

    /// [`fast_check`](Self::fast_check) without touching the stats, for a
    /// second look within the same request.
    pub fn fast_peek(
        &self,
        id: IdentityId,
        now: Timestamp,
        tolerate_breaks: bool,
    ) -> Option<Arc<VerificationRecord>> {
        self.fast_lookup(id, now, tolerate_breaks).ok()
    }

    fn fast_lookup(
        &self,
        id: IdentityId,
        now: Timestamp,
        tolerate_breaks: bool,
    ) -> Result<Arc<VerificationRecord>, CacheMiss> {
        self.get(id).ok_or(CacheMiss::Absent).and_then(|record| {
            if record.has_breaks() && !tolerate_breaks {
                Err(CacheMiss::Broken)
            } else if record.cached_at.has_expired(self.ttls.fast_secs, now) {
                Err(CacheMiss::Timeout)
            } else {
                Ok(record)
            }
        })
    }

    /// Slow-tier lookup against the identity's `current` freshness marker.
    ///
    /// A hit re-inserts a copy of the record with `cached_at = now`, so the
    /// next plain request is answered by the fast tier.
    pub fn slow_check(
        &self,
        id: IdentityId,
        current: &FreshnessMarker,
        now: Timestamp,
        tolerate_breaks: bool,
    ) -> Option<Arc<VerificationRecord>> {
        let outcome = self.get(id).ok_or(CacheMiss::Absent).and_then(|record| {
            let ttl = if record.has_breaks() {
                self.ttls.broken_secs
            } else {
                self.ttls.slow_secs
            };
            if record.has_breaks() && !tolerate_breaks {
                Err(CacheMiss::Broken)
            } else if record.last_fully_identified_at.has_expired(ttl, now) {
                Err(CacheMiss::Timeout)
            } else if !record.snapshot.freshness.dominates(current) {
                Err(CacheMiss::Stale)
            } else {
                Ok(record)
            }
        });
        self.count(&self.slow_stats, &outcome);

        let record = outcome.ok()?;
        let refreshed = Arc::new(VerificationRecord {
            cached_at: now,
            ..(*record).clone()
        });
        self.insert_arc(refreshed.clone());
        Some(refreshed)
    }

    /// Insert or replace the record for its identity.
    pub fn insert(&self, record: VerificationRecord) {
        self.insert_arc(Arc::new(record));
    }

    fn insert_arc(&self, record: Arc<VerificationRecord>) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id(), record);
    }

    /// Raw lookup, no freshness checks and no stats.
    pub fn get(&self, id: IdentityId) -> Option<Arc<VerificationRecord>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fast_stats(&self) -> TierStats {
        *self.fast_stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn slow_stats(&self) -> TierStats {
        *self.slow_stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn count(&self, stats: &Mutex<TierStats>, outcome: &Result<Arc<VerificationRecord>, CacheMiss>) {
        stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(outcome.as_ref().map(|_| ()).map_err(|m| *m));
    }
}
