//! Proof facts accumulated while verifying an identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The observed state of a single proof factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProofState {
    /// Claimed but not (yet) checked.
    Unknown,
    /// Checked and confirmed against the remote service.
    Confirmed,
    /// Looks broken right now, but may recover (timeouts, rate limits, 5xx).
    SoftBroken,
    /// Server-confirmed revoked or deleted.
    HardBroken,
}

impl ProofState {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }

    pub fn is_broken(&self) -> bool {
        matches!(self, Self::SoftBroken | Self::HardBroken)
    }
}

/// `(factor type, factor value, state)`, e.g. `("twitter", "alice", Confirmed)`.
///
/// Both the factor type and the value are stored lower-cased so that
/// matching against assertions is case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofFact {
    pub key: String,
    pub value: String,
    pub state: ProofState,
}

impl ProofFact {
    pub fn new(key: impl Into<String>, value: impl Into<String>, state: ProofState) -> Self {
        Self {
            key: key.into().to_lowercase(),
            value: value.into().to_lowercase(),
            state,
        }
    }

    pub fn confirmed(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, value, ProofState::Confirmed)
    }

    /// The `(key, value)` identity of this fact, independent of its state.
    pub fn factor(&self) -> (&str, &str) {
        (&self.key, &self.value)
    }
}

impl fmt::Display for ProofFact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.key)
    }
}
