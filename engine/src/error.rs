use thiserror::Error;

use vetted_assertion::AssertionError;
use vetted_store::StoreError;
use vetted_types::IdentityId;

/// Outcome of a failed verification run.
///
/// `Clone` because one outcome is handed to the waiting caller, to the
/// final-result observers of the same run, and to the background
/// identifier's observer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum IdentifyError {
    #[error("no identity id given")]
    NoIdentityId,

    #[error("invalid assertion: {0}")]
    InvalidAssertion(#[from] AssertionError),

    #[error("local assertion '{0}' not met")]
    UnmetLocalAssertion(String),

    #[error("remote assertion '{0}' not met")]
    UnmetRemoteAssertion(String),

    #[error("identity not found: {0}")]
    IdentityNotFound(IdentityId),

    #[error("identity {0} has been deleted")]
    IdentityDeleted(IdentityId),

    #[error("login required")]
    LoginRequired,

    #[error("proof {proof} looks broken: {reason}")]
    ProofSoftFailure { proof: String, reason: String },

    #[error("proof {proof} failed: {reason}")]
    ProofHardFailure { proof: String, reason: String },

    #[error("identify did not complete")]
    DidNotComplete,

    #[error("load error: {0}")]
    Load(StoreError),
}

/// Backoff class of a failure, used only by the background identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// May recover by itself shortly.
    Soft,
    /// Needs a change on the identity's side before it can pass.
    Hard,
}

impl IdentifyError {
    pub fn failure_class(&self) -> FailureClass {
        match self {
            Self::ProofSoftFailure { .. } | Self::DidNotComplete | Self::Load(_) => FailureClass::Soft,
            _ => FailureClass::Hard,
        }
    }

    pub fn is_proof_failure(&self) -> bool {
        matches!(
            self,
            Self::ProofSoftFailure { .. } | Self::ProofHardFailure { .. }
        )
    }
}

impl From<StoreError> for IdentifyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::IdentityNotFound(id),
            StoreError::LoginRequired => Self::LoginRequired,
            other => Self::Load(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_onto_taxonomy() {
        let id = IdentityId::new([3; 16]);
        assert_eq!(
            IdentifyError::from(StoreError::NotFound(id)),
            IdentifyError::IdentityNotFound(id)
        );
        assert_eq!(
            IdentifyError::from(StoreError::LoginRequired),
            IdentifyError::LoginRequired
        );
        assert!(matches!(
            IdentifyError::from(StoreError::Backend("x".into())),
            IdentifyError::Load(_)
        ));
    }

    #[test]
    fn failure_classes() {
        let soft = IdentifyError::ProofSoftFailure {
            proof: "alice@twitter".into(),
            reason: "timeout".into(),
        };
        let hard = IdentifyError::ProofHardFailure {
            proof: "alice@twitter".into(),
            reason: "deleted".into(),
        };
        assert_eq!(soft.failure_class(), FailureClass::Soft);
        assert_eq!(hard.failure_class(), FailureClass::Hard);
        assert_eq!(IdentifyError::DidNotComplete.failure_class(), FailureClass::Soft);
        assert_eq!(
            IdentifyError::UnmetRemoteAssertion("a@b".into()).failure_class(),
            FailureClass::Hard
        );
        assert!(soft.is_proof_failure());
        assert!(!IdentifyError::LoginRequired.is_proof_failure());
    }
}
