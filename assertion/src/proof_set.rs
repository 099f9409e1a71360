//! Append-only collection of proof facts gathered during one verification run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use vetted_types::{ProofFact, ProofState};

/// Proof facts indexed by factor type, deduplicated by `(key, value)`.
///
/// Facts are never removed. Adding a fact for a factor that is already
/// present is a no-op, except that an [`ProofState::Unknown`] placeholder is
/// upgraded once a checked state arrives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSet {
    proofs: BTreeMap<String, Vec<ProofFact>>,
}

impl ProofSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_facts(facts: impl IntoIterator<Item = ProofFact>) -> Self {
        let mut ps = Self::new();
        for fact in facts {
            ps.add(fact);
        }
        ps
    }

    /// Add a fact. Returns `true` if the set changed.
    pub fn add(&mut self, fact: ProofFact) -> bool {
        let bucket = self.proofs.entry(fact.key.clone()).or_default();
        match bucket.iter_mut().find(|f| f.value == fact.value) {
            Some(existing) if existing.state == ProofState::Unknown && fact.state != ProofState::Unknown => {
                existing.state = fact.state;
                true
            }
            Some(_) => false,
            None => {
                bucket.push(fact);
                true
            }
        }
    }

    /// All facts whose factor type is one of `keys`.
    pub fn get<'a>(&'a self, keys: &'a [&'a str]) -> impl Iterator<Item = &'a ProofFact> + 'a {
        keys.iter()
            .filter_map(move |k| self.proofs.get(*k))
            .flatten()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProofFact> {
        self.proofs.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.proofs.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The recorded state for a factor, if present.
    pub fn state_of(&self, key: &str, value: &str) -> Option<ProofState> {
        self.proofs
            .get(key)?
            .iter()
            .find(|f| f.value == value)
            .map(|f| f.state)
    }
}
