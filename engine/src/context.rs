//! Shared state and collaborators for verification runs.

use std::sync::Arc;

use tracing::warn;

use vetted_store::{IdentifyOutcome, NotificationSink, ProofChecker, TrackStore, UserLoader};
use vetted_types::{Clock, IdentityId, ProofFact, Timestamp};

use crate::cache::CacheTtls;
use crate::{EngineConfig, EngineMetrics, SingleFlightLockTable, VerificationCache};

/// Everything a verification run needs besides its own request.
///
/// Cheap to clone: every field is shared. One context per process is the
/// normal setup; tests build isolated ones.
#[derive(Clone)]
pub struct VerifierContext {
    pub config: Arc<EngineConfig>,
    pub locks: SingleFlightLockTable,
    pub cache: Arc<VerificationCache>,
    pub clock: Arc<dyn Clock>,
    pub users: Arc<dyn UserLoader>,
    pub checker: Arc<dyn ProofChecker>,
    pub tracks: Option<Arc<dyn TrackStore>>,
    pub sink: Option<Arc<dyn NotificationSink>>,
    pub metrics: Option<Arc<EngineMetrics>>,
}

impl VerifierContext {
    pub fn new(
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        users: Arc<dyn UserLoader>,
        checker: Arc<dyn ProofChecker>,
    ) -> Self {
        let cache = VerificationCache::new(CacheTtls {
            fast_secs: config.fast_cache_ttl_secs,
            slow_secs: config.slow_cache_ttl_secs,
            broken_secs: config.broken_cache_ttl_secs,
        });
        let metrics = config.enable_metrics.then(|| Arc::new(EngineMetrics::new()));
        Self {
            config: Arc::new(config),
            locks: SingleFlightLockTable::new(),
            cache: Arc::new(cache),
            clock,
            users,
            checker,
            tracks: None,
            sink: None,
            metrics,
        }
    }

    pub fn with_track_store(mut self, tracks: Arc<dyn TrackStore>) -> Self {
        self.tracks = Some(tracks);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<EngineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run `f` against the metrics, if enabled.
    pub(crate) fn metrics(&self, f: impl FnOnce(&EngineMetrics)) {
        if let Some(m) = &self.metrics {
            f(m);
        }
    }

    pub(crate) fn update_lock_gauge(&self) {
        let held = self.locks.len();
        self.metrics(|m| m.lock_table_size.set(held as i64));
    }

    pub(crate) fn notify_started(&self, id: IdentityId) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.identify_started(id) {
                warn!(identity = %id, error = %e, "notification sink failed");
            }
        }
    }

    pub(crate) fn notify_proof(&self, id: IdentityId, fact: &ProofFact) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.proof_checked(id, fact) {
                warn!(identity = %id, proof = %fact, error = %e, "notification sink failed");
            }
        }
    }

    pub(crate) fn notify_finished(&self, id: IdentityId, outcome: &IdentifyOutcome) {
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.identify_finished(id, outcome) {
                warn!(identity = %id, error = %e, "notification sink failed");
            }
        }
    }
}
