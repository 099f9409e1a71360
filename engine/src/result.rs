//! Request options and the verification result handed back to callers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vetted_assertion::ProofSet;
use vetted_types::{IdentityId, IdentitySnapshot, ProofFact, Timestamp};

/// Per-request knobs for [`IdentifyVerifier`](crate::IdentifyVerifier).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentifyOptions {
    /// Wait for the final result instead of the first (eager) one.
    pub always_block: bool,
    /// Bypass verification-cache reads and ask the proof checker to skip
    /// its own caches.
    pub force_remote_check: bool,
    /// Verify the caller's own identity like any other.
    pub no_skip_self: bool,
    /// Disable every early out and return the full proof set.
    pub need_proof_set: bool,
    /// Do not load the caller's own identity (no tracking, no self check).
    pub act_logged_out: bool,
    /// Succeed after the local checks without any remote proof checks.
    pub skip_external_checks: bool,
    /// Load deleted identities instead of failing; only remote assertions
    /// fail for them.
    pub allow_deleted_users: bool,
    /// Succeed without proof checks when the caller does not track the target.
    pub allow_untracked_fast_path: bool,
    /// Report proof failures as breaks on a successful result.
    pub warn_on_broken_proofs: bool,
    /// Stop waiting after this much wall time with `DidNotComplete`. The
    /// run itself keeps going in the background. Measured by the tokio
    /// timer, not the context's [`Clock`](vetted_types::Clock): it bounds how
    /// long a caller is blocked, not how old a result may be.
    pub timeout: Option<Duration>,
}

impl IdentifyOptions {
    /// Options used by the background identifier.
    pub fn background() -> Self {
        Self {
            always_block: true,
            force_remote_check: true,
            ..Self::default()
        }
    }

    /// Whether the caller waits for the final write of the result slot.
    pub fn blocks_until_final(&self) -> bool {
        self.always_block || self.need_proof_set
    }

    /// Whether the run may answer before checking proofs.
    pub fn allows_early_outs(&self) -> bool {
        !self.need_proof_set && !self.force_remote_check
    }
}

/// How a result was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultSource {
    FastCache,
    SlowCache,
    /// Target is the caller itself.
    SelfLoad,
    /// No tracking statement, checks skipped on request.
    UntrackedFastPath,
    SkippedExternalChecks,
    /// Released before proof checking began; checks continue in the background.
    Eager,
    /// Released once every asserted remote factor confirmed.
    Partial,
    /// After every proof check finished.
    Live,
}

/// A proof that failed where the caller chose to tolerate failures, or a
/// tracked proof that no longer holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBreak {
    pub proof: ProofFact,
    pub reason: String,
}

impl ProofBreak {
    pub fn new(proof: ProofFact, reason: impl Into<String>) -> Self {
        Self {
            proof,
            reason: reason.into(),
        }
    }

    pub fn is_hard(&self) -> bool {
        self.proof.state == vetted_types::ProofState::HardBroken
    }
}

/// A successful verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub identity: IdentityId,
    pub name: String,
    pub snapshot: Arc<IdentitySnapshot>,
    /// When the identity was last fully verified.
    pub identified_at: Timestamp,
    pub source: ResultSource,
    /// Every proof fact gathered, when requested via `need_proof_set`.
    pub proof_set: Option<ProofSet>,
    pub breaks: Vec<ProofBreak>,
}

impl VerificationResult {
    pub fn new(snapshot: Arc<IdentitySnapshot>, identified_at: Timestamp, source: ResultSource) -> Self {
        Self {
            identity: snapshot.id,
            name: snapshot.name.clone(),
            snapshot,
            identified_at,
            source,
            proof_set: None,
            breaks: Vec::new(),
        }
    }

    pub fn with_breaks(mut self, breaks: Vec<ProofBreak>) -> Self {
        self.breaks = breaks;
        self
    }

    pub fn with_proof_set(mut self, proof_set: ProofSet) -> Self {
        self.proof_set = Some(proof_set);
        self
    }

    pub fn has_breaks(&self) -> bool {
        !self.breaks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_options_block_and_force() {
        let opts = IdentifyOptions::background();
        assert!(opts.blocks_until_final());
        assert!(!opts.allows_early_outs());
        assert!(IdentifyOptions::default().allows_early_outs());
    }

    #[test]
    fn need_proof_set_blocks() {
        let opts = IdentifyOptions {
            need_proof_set: true,
            ..IdentifyOptions::default()
        };
        assert!(opts.blocks_until_final());
        assert!(!opts.allows_early_outs());
    }
}
