use thiserror::Error;

use vetted_types::IdentityId;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("identity not found: {0}")]
    NotFound(IdentityId),

    #[error("no logged-in identity")]
    LoginRequired,

    #[error("directory backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("notification sink error: {0}")]
    Sink(String),
}
