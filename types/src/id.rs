//! Stable identifier for a user account.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// A 16-byte identity identifier, rendered as 32 lowercase hex characters.
///
/// Immutable once assigned; it is the key for the verification cache, the
/// single-flight lock table, and the background watch list.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityId([u8; 16]);

impl IdentityId {
    /// The nil identifier. Never assigned to a real identity.
    pub const NIL: Self = Self([0u8; 16]);

    /// Length of the hex rendering.
    pub const HEX_LEN: usize = 32;

    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Parse a 32-character hex identifier.
    pub fn from_hex(s: &str) -> Result<Self, TypesError> {
        if s.len() != Self::HEX_LEN {
            return Err(TypesError::InvalidIdentityId(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                s.len()
            )));
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| TypesError::InvalidIdentityId(format!("{s}: {e}")))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdentityId({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for IdentityId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}
