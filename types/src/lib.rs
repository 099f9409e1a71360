//! Fundamental types for identity verification.
//!
//! This crate defines the types shared across every other crate in the workspace:
//! identity identifiers, timestamps and the injectable clock, identity snapshots
//! (keys, claimed proofs, freshness markers), and proof facts.

pub mod error;
pub mod id;
pub mod identity;
pub mod proof;
pub mod time;

pub use error::TypesError;
pub use id::IdentityId;
pub use identity::{
    FreshnessMarker, IdentitySnapshot, IdentityStatus, KeyFamily, ProofClaim, PublicKeyEntry,
};
pub use proof::{ProofFact, ProofState};
pub use time::{format_duration, Clock, SystemClock, Timestamp};
