//! Identity loading.

use futures_util::future::BoxFuture;

use vetted_types::{IdentityId, IdentitySnapshot};

use crate::StoreError;

/// Loads identity snapshots (key family, claimed proofs, freshness marker)
/// from the directory.
pub trait UserLoader: Send + Sync {
    /// Load `id`. A deleted identity is returned with
    /// [`IdentityStatus::Deleted`](vetted_types::IdentityStatus::Deleted);
    /// an unknown one fails with [`StoreError::NotFound`].
    fn load_by_id(&self, id: IdentityId) -> BoxFuture<'_, Result<IdentitySnapshot, StoreError>>;

    /// Load the caller's own identity. `Ok(None)` when nobody is logged in.
    fn load_self(&self) -> BoxFuture<'_, Result<Option<IdentitySnapshot>, StoreError>>;
}
