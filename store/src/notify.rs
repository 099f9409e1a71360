//! Best-effort progress callbacks.

use serde::{Deserialize, Serialize};

use vetted_types::{IdentityId, ProofFact};

use crate::StoreError;

/// Summary handed to [`NotificationSink::identify_finished`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyOutcome {
    /// Rendered error, `None` on success.
    pub error: Option<String>,
    /// Number of tolerated proof breaks.
    pub breaks: usize,
}

impl IdentifyOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Receives verification progress, e.g. to drive an identity card in a UI.
///
/// Errors are logged by the engine and otherwise ignored.
pub trait NotificationSink: Send + Sync {
    fn identify_started(&self, id: IdentityId) -> Result<(), StoreError>;

    fn proof_checked(&self, id: IdentityId, fact: &ProofFact) -> Result<(), StoreError>;

    fn identify_finished(&self, id: IdentityId, outcome: &IdentifyOutcome) -> Result<(), StoreError>;
}
