//! Shared wiring for engine integration tests: a real engine context over
//! the nullable collaborators, driven by a virtual clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use vetted_engine::{EngineConfig, IdentifyVerifier, VerifierContext};
use vetted_nullables::{NullClock, NullDirectory, NullProofChecker, NullTrackStore, RecordingSink};
use vetted_types::{
    FreshnessMarker, IdentityId, IdentitySnapshot, ProofClaim, PublicKeyEntry,
};

pub const START: u64 = 1_700_000_000;

pub fn id(byte: u8) -> IdentityId {
    IdentityId::new([byte; 16])
}

pub fn alice_id() -> IdentityId {
    id(0xa1)
}

pub fn bob_id() -> IdentityId {
    id(0xb0)
}

/// Alice: one PGP key and three remote proofs.
pub fn alice() -> IdentitySnapshot {
    IdentitySnapshot::new(alice_id(), "alice")
        .with_key(PublicKeyEntry::pgp("0120aa", "deadbeefc0ffee"))
        .with_proof(ProofClaim::new("twitter", "alice", "link-1"))
        .with_proof(ProofClaim::new("github", "alice", "link-2"))
        .with_proof(ProofClaim::new("dns", "alice.example.com", "link-3"))
        .with_freshness(FreshnessMarker::new(1, 0))
}

/// Bob: no remote proofs.
pub fn bob() -> IdentitySnapshot {
    IdentitySnapshot::new(bob_id(), "bob")
        .with_key(PublicKeyEntry::new("0120bb"))
        .with_freshness(FreshnessMarker::new(1, 0))
}

pub struct Harness {
    pub clock: NullClock,
    pub directory: Arc<NullDirectory>,
    pub checker: Arc<NullProofChecker>,
    pub tracks: Arc<NullTrackStore>,
    pub sink: Arc<RecordingSink>,
    pub ctx: VerifierContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(config, Arc::new(RecordingSink::new()))
    }

    pub fn with_sink(sink: RecordingSink) -> Self {
        Self::build(test_config(), Arc::new(sink))
    }

    fn build(config: EngineConfig, sink: Arc<RecordingSink>) -> Self {
        let clock = NullClock::new(START);
        let directory = Arc::new(NullDirectory::new());
        directory.insert(alice());
        directory.insert(bob());
        let checker = Arc::new(NullProofChecker::new());
        let tracks = Arc::new(NullTrackStore::new());

        let ctx = VerifierContext::new(
            config,
            Arc::new(clock.clone()),
            directory.clone(),
            checker.clone(),
        )
        .with_track_store(tracks.clone())
        .with_sink(sink.clone());

        Self {
            clock,
            directory,
            checker,
            tracks,
            sink,
            ctx,
        }
    }

    pub fn verifier(&self, target: IdentityId) -> IdentifyVerifier {
        IdentifyVerifier::new(self.ctx.clone(), target)
    }

    /// Wait (in wall time) until every single-flight lock is released.
    pub async fn settle(&self) {
        for _ in 0..200 {
            if self.ctx.locks.is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("locks still held");
    }
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.watch.delay_slot_secs = 0;
    config
}
