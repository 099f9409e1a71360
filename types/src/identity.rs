//! Identity snapshots as loaded from the directory.
//!
//! A snapshot is the exported view of one identity at one sigchain version:
//! its key family, the remote proofs its sigchain claims, and the freshness
//! marker used to decide whether a cached verification still dominates it.

use serde::{Deserialize, Serialize};

use crate::{IdentityId, ProofFact, ProofState, Timestamp};

/// Account status as reported by the directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityStatus {
    Active,
    Deleted,
}

/// One public key in an identity's key family.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyEntry {
    /// Key identifier (hex).
    pub kid: String,
    /// PGP fingerprint (hex), if this is a PGP key.
    pub pgp_fingerprint: Option<String>,
    pub revoked: bool,
}

impl PublicKeyEntry {
    pub fn new(kid: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            pgp_fingerprint: None,
            revoked: false,
        }
    }

    pub fn pgp(kid: impl Into<String>, fingerprint: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            pgp_fingerprint: Some(fingerprint.into().to_lowercase()),
            revoked: false,
        }
    }
}

/// The live keys of an identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFamily {
    pub keys: Vec<PublicKeyEntry>,
}

impl KeyFamily {
    pub fn new(keys: Vec<PublicKeyEntry>) -> Self {
        Self { keys }
    }

    /// Keys that have not been revoked.
    pub fn live(&self) -> impl Iterator<Item = &PublicKeyEntry> {
        self.keys.iter().filter(|k| !k.revoked)
    }

    pub fn pgp_fingerprints(&self) -> impl Iterator<Item = &str> {
        self.live().filter_map(|k| k.pgp_fingerprint.as_deref())
    }
}

/// A remote proof claimed in the identity's sigchain, e.g. `alice@twitter`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProofClaim {
    pub service: String,
    pub value: String,
    /// Identifier of the sigchain link that made the claim.
    pub link_id: String,
}

impl ProofClaim {
    pub fn new(service: impl Into<String>, value: impl Into<String>, link_id: impl Into<String>) -> Self {
        Self {
            service: service.into().to_lowercase(),
            value: value.into().to_lowercase(),
            link_id: link_id.into(),
        }
    }

    pub fn to_fact(&self, state: ProofState) -> ProofFact {
        ProofFact::new(self.service.clone(), self.value.clone(), state)
    }
}

/// Sigchain-derived version of an identity.
///
/// A cached verification is only reusable if the cached marker dominates the
/// current one: nothing affecting the sigchain happened since it was taken.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FreshnessMarker {
    /// Sequence number of the last sigchain link.
    pub sigchain_seqno: u64,
    /// Server-side version bumped on identity-level changes (resets, deletes).
    pub id_version: u64,
}

impl FreshnessMarker {
    pub fn new(sigchain_seqno: u64, id_version: u64) -> Self {
        Self {
            sigchain_seqno,
            id_version,
        }
    }

    /// True if `self` is at least as new as `current` in every component.
    pub fn dominates(&self, current: &FreshnessMarker) -> bool {
        self.sigchain_seqno >= current.sigchain_seqno && self.id_version >= current.id_version
    }
}

/// Exported view of an identity: keys, claimed proofs, version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySnapshot {
    pub id: IdentityId,
    pub name: String,
    pub status: IdentityStatus,
    pub keys: KeyFamily,
    pub proofs: Vec<ProofClaim>,
    pub freshness: FreshnessMarker,
    /// When the directory produced this snapshot.
    pub loaded_at: Timestamp,
}

impl IdentitySnapshot {
    pub fn new(id: IdentityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into().to_lowercase(),
            status: IdentityStatus::Active,
            keys: KeyFamily::default(),
            proofs: Vec::new(),
            freshness: FreshnessMarker::default(),
            loaded_at: Timestamp::EPOCH,
        }
    }

    pub fn with_key(mut self, key: PublicKeyEntry) -> Self {
        self.keys.keys.push(key);
        self
    }

    pub fn with_proof(mut self, claim: ProofClaim) -> Self {
        self.proofs.push(claim);
        self
    }

    pub fn with_freshness(mut self, freshness: FreshnessMarker) -> Self {
        self.freshness = freshness;
        self
    }

    pub fn with_status(mut self, status: IdentityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_deleted(&self) -> bool {
        self.status == IdentityStatus::Deleted
    }

    /// Facts checkable without network access: username, id, PGP fingerprints.
    pub fn base_facts(&self) -> Vec<ProofFact> {
        let mut facts = vec![
            ProofFact::confirmed("keybase", self.name.clone()),
            ProofFact::confirmed("uid", self.id.to_hex()),
        ];
        facts.extend(
            self.keys
                .pgp_fingerprints()
                .map(|fp| ProofFact::confirmed("fingerprint", fp)),
        );
        facts
    }

    /// Facts for every claimed remote proof, all in [`ProofState::Unknown`].
    pub fn claimed_facts(&self) -> Vec<ProofFact> {
        self.proofs
            .iter()
            .map(|c| c.to_fact(ProofState::Unknown))
            .collect()
    }
}
