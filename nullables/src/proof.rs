//! Nullable proof checker: scripted results, optional per-proof gates.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

use vetted_store::{ProofChecker, ProofResult};
use vetted_types::{IdentityId, ProofClaim, ProofState};

type ClaimKey = (String, String);

fn claim_key(service: &str, value: &str) -> ClaimKey {
    (service.to_lowercase(), value.to_lowercase())
}

/// One recorded invocation of [`ProofChecker::check`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckCall {
    pub owner: IdentityId,
    pub claim: ProofClaim,
    pub force: bool,
}

/// A proof checker that answers from a script.
///
/// Unscripted proofs resolve to the default state ([`ProofState::Confirmed`]
/// unless changed). A proof can be *held*: its check is recorded as soon as
/// it starts but does not resolve until the proof is released.
pub struct NullProofChecker {
    default_state: Mutex<ProofState>,
    scripted: Mutex<HashMap<ClaimKey, ProofState>>,
    gates: Mutex<HashMap<ClaimKey, watch::Sender<bool>>>,
    calls: Mutex<Vec<CheckCall>>,
}

impl NullProofChecker {
    pub fn new() -> Self {
        Self {
            default_state: Mutex::new(ProofState::Confirmed),
            scripted: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// State returned for proofs without a scripted result.
    pub fn set_default(&self, state: ProofState) {
        *self.default_state.lock().unwrap() = state;
    }

    /// Script the result for `value@service`.
    pub fn set_state(&self, service: &str, value: &str, state: ProofState) {
        self.scripted
            .lock()
            .unwrap()
            .insert(claim_key(service, value), state);
    }

    /// Block checks of `value@service` until [`release`](Self::release).
    pub fn hold(&self, service: &str, value: &str) {
        let (tx, _) = watch::channel(false);
        self.gates
            .lock()
            .unwrap()
            .insert(claim_key(service, value), tx);
    }

    /// Let pending and future checks of `value@service` resolve.
    pub fn release(&self, service: &str, value: &str) {
        if let Some(tx) = self.gates.lock().unwrap().remove(&claim_key(service, value)) {
            tx.send_replace(true);
        }
    }

    /// Total number of checks started.
    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Checks started for proofs owned by `owner`.
    pub fn calls_for(&self, owner: IdentityId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.owner == owner)
            .count()
    }

    pub fn call_log(&self) -> Vec<CheckCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for NullProofChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProofChecker for NullProofChecker {
    fn check(&self, owner: IdentityId, claim: ProofClaim, force: bool) -> BoxFuture<'_, ProofResult> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(CheckCall {
                owner,
                claim: claim.clone(),
                force,
            });

            let key = claim_key(&claim.service, &claim.value);
            let gate = self.gates.lock().unwrap().get(&key).map(watch::Sender::subscribe);
            if let Some(mut rx) = gate {
                // A dropped sender means the gate was released.
                let _ = rx.wait_for(|open| *open).await;
            }

            let scripted = self.scripted.lock().unwrap().get(&key).copied();
            let state = scripted.unwrap_or_else(|| *self.default_state.lock().unwrap());
            let result = ProofResult::new(claim, state);
            if state.is_broken() {
                result.with_detail("scripted failure")
            } else {
                result
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn claim(service: &str, value: &str) -> ProofClaim {
        ProofClaim::new(service, value, "link")
    }

    #[tokio::test]
    async fn scripted_and_default_states() {
        let checker = NullProofChecker::new();
        let owner = IdentityId::new([1; 16]);
        checker.set_state("github", "alice", ProofState::HardBroken);

        let ok = checker.check(owner, claim("twitter", "alice"), false).await;
        assert_eq!(ok.state, ProofState::Confirmed);
        let broken = checker.check(owner, claim("GitHub", "Alice"), true).await;
        assert_eq!(broken.state, ProofState::HardBroken);
        assert!(broken.detail.is_some());

        assert_eq!(checker.calls(), 2);
        assert_eq!(checker.calls_for(owner), 2);
        assert!(checker.call_log()[1].force);
    }

    #[tokio::test]
    async fn held_check_resolves_on_release() {
        let checker = Arc::new(NullProofChecker::new());
        checker.hold("twitter", "alice");

        let task = {
            let checker = checker.clone();
            tokio::spawn(async move {
                checker
                    .check(IdentityId::new([1; 16]), claim("twitter", "alice"), false)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(checker.calls(), 1);
        assert!(!task.is_finished());

        checker.release("twitter", "alice");
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.state, ProofState::Confirmed);
    }
}
