//! Nullable notification sink: record events instead of rendering them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use vetted_store::{IdentifyOutcome, NotificationSink, StoreError};
use vetted_types::{IdentityId, ProofFact};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    Started(IdentityId),
    ProofChecked(IdentityId, ProofFact),
    Finished(IdentityId, IdentifyOutcome),
}

/// A sink that records every event. Optionally fails every call after
/// recording it, to exercise the engine's error swallowing.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
    failing: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every callback returns an error.
    pub fn failing() -> Self {
        let sink = Self::new();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    /// All recorded events (for assertions).
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Recorded finish outcomes for `id`.
    pub fn finished(&self, id: IdentityId) -> Vec<IdentifyOutcome> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Finished(who, outcome) if *who == id => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear all state.
    pub fn reset(&self) {
        self.events.lock().unwrap().clear();
    }

    fn record(&self, event: SinkEvent) -> Result<(), StoreError> {
        self.events.lock().unwrap().push(event);
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Sink("recording sink set to fail".into()))
        } else {
            Ok(())
        }
    }
}

impl NotificationSink for RecordingSink {
    fn identify_started(&self, id: IdentityId) -> Result<(), StoreError> {
        self.record(SinkEvent::Started(id))
    }

    fn proof_checked(&self, id: IdentityId, fact: &ProofFact) -> Result<(), StoreError> {
        self.record(SinkEvent::ProofChecked(id, fact.clone()))
    }

    fn identify_finished(&self, id: IdentityId, outcome: &IdentifyOutcome) -> Result<(), StoreError> {
        self.record(SinkEvent::Finished(id, outcome.clone()))
    }
}
