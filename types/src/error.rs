//! Error type for parsing and validating fundamental types.

use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid identity id: {0}")]
    InvalidIdentityId(String),

    #[error("invalid key fingerprint: {0}")]
    InvalidFingerprint(String),
}
