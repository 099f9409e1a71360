//! Per-service proof checking.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use vetted_types::{IdentityId, ProofClaim, ProofFact, ProofState};

/// Outcome of checking one claimed proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofResult {
    pub claim: ProofClaim,
    pub state: ProofState,
    /// Human-readable reason for a broken result.
    pub detail: Option<String>,
}

impl ProofResult {
    pub fn new(claim: ProofClaim, state: ProofState) -> Self {
        Self {
            claim,
            state,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn to_fact(&self) -> ProofFact {
        self.claim.to_fact(self.state)
    }
}

/// Checks a single remote proof (an HTTP fetch of a post, a DNS lookup, ...).
///
/// Called once per claimed proof and possibly concurrently for different
/// proofs of the same identity. Failures are reported through
/// [`ProofResult::state`], never as an error.
pub trait ProofChecker: Send + Sync {
    /// `force` asks the checker to bypass any result cache of its own.
    fn check(&self, owner: IdentityId, claim: ProofClaim, force: bool) -> BoxFuture<'_, ProofResult>;
}
