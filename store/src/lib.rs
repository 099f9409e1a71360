//! Collaborator interfaces for identity verification.
//!
//! The engine never loads sigchains, fetches proofs, or persists tracking
//! statements itself. Every backend (the real directory client, the
//! in-memory test doubles in `vetted-nullables`) implements these traits and
//! the engine depends only on the traits.
//!
//! Async methods return [`BoxFuture`](futures_util::future::BoxFuture) so the
//! traits stay object safe and can be shared as `Arc<dyn Trait>`.

pub mod error;
pub mod notify;
pub mod proof;
pub mod track;
pub mod user;

pub use error::StoreError;
pub use notify::{IdentifyOutcome, NotificationSink};
pub use proof::{ProofChecker, ProofResult};
pub use track::{TrackRecord, TrackStore};
pub use user::UserLoader;
