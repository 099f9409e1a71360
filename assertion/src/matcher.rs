//! Incremental evaluation of a remote assertion as proof results arrive.

use vetted_types::ProofFact;

use crate::{AssertionAnd, ProofSet};

/// What a single new fact means for the remote assertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartialMatch {
    /// The fact does not name any asserted factor.
    Irrelevant,
    /// Relevant, but the assertion is not decided yet.
    Pending,
    /// Every asserted factor is now confirmed.
    Satisfied,
    /// An asserted factor came back broken.
    Disqualified(ProofFact),
}

/// Accumulates proof facts for one verification run and decides the remote
/// assertion as early as possible.
///
/// Re-evaluating the whole conjunction per fact is quadratic in the number of
/// asserted factors, which stays small (a handful of social proofs).
#[derive(Debug)]
pub struct ProofSetMatcher {
    remote: AssertionAnd,
    received: ProofSet,
    failure: Option<ProofFact>,
    satisfied: bool,
}

impl ProofSetMatcher {
    /// Start from `base`, typically the identity's local base facts.
    pub fn new(remote: AssertionAnd, base: ProofSet) -> Self {
        Self {
            remote,
            received: base,
            failure: None,
            satisfied: false,
        }
    }

    /// Record `fact` and re-evaluate.
    ///
    /// The first disqualifying fact sticks: later confirmations never turn a
    /// disqualified assertion back into a satisfied one.
    pub fn observe(&mut self, fact: ProofFact) -> PartialMatch {
        self.received.add(fact.clone());

        if !self.remote.has_factor(&fact) {
            return PartialMatch::Irrelevant;
        }
        if fact.state.is_broken() && self.failure.is_none() {
            self.failure = Some(fact);
        }
        if let Some(failure) = &self.failure {
            return PartialMatch::Disqualified(failure.clone());
        }
        if self.remote.match_set(&self.received) {
            self.satisfied = true;
            return PartialMatch::Satisfied;
        }
        PartialMatch::Pending
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn failure(&self) -> Option<&ProofFact> {
        self.failure.as_ref()
    }

    pub fn received(&self) -> &ProofSet {
        &self.received
    }

    pub fn into_received(self) -> ProofSet {
        self.received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AssertionSet;
    use vetted_types::ProofState;

    fn matcher(assertion: &str) -> ProofSetMatcher {
        let set = AssertionSet::parse(assertion).unwrap();
        ProofSetMatcher::new(set.remote().clone(), ProofSet::new())
    }

    #[test]
    fn satisfied_only_after_last_factor_confirms() {
        let mut m = matcher("alice@twitter+alice@github");
        assert_eq!(
            m.observe(ProofFact::confirmed("twitter", "alice")),
            PartialMatch::Pending
        );
        assert_eq!(
            m.observe(ProofFact::confirmed("reddit", "alice")),
            PartialMatch::Irrelevant
        );
        assert_eq!(
            m.observe(ProofFact::confirmed("github", "alice")),
            PartialMatch::Satisfied
        );
        assert!(m.is_satisfied());
        assert_eq!(m.received().len(), 3);
    }

    #[test]
    fn first_failure_disqualifies() {
        let mut m = matcher("alice@twitter+alice@github");
        let broken = ProofFact::new("github", "alice", ProofState::SoftBroken);
        assert_eq!(m.observe(broken.clone()), PartialMatch::Disqualified(broken.clone()));
        assert_eq!(
            m.observe(ProofFact::confirmed("twitter", "alice")),
            PartialMatch::Disqualified(broken)
        );
        assert!(!m.is_satisfied());
    }

    #[test]
    fn irrelevant_failures_do_not_disqualify() {
        let mut m = matcher("alice@twitter");
        let broken = ProofFact::new("github", "alice", ProofState::HardBroken);
        assert_eq!(m.observe(broken), PartialMatch::Irrelevant);
        assert!(m.failure().is_none());
    }

    #[test]
    fn empty_remote_never_settles() {
        let mut m = ProofSetMatcher::new(AssertionAnd::default(), ProofSet::new());
        assert_eq!(
            m.observe(ProofFact::confirmed("twitter", "alice")),
            PartialMatch::Irrelevant
        );
        assert!(!m.is_satisfied());
    }
}
