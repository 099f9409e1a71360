//! Identity verification engine.
//!
//! The engine answers "is this identity still who it claims to be, and does
//! it satisfy this assertion" for any number of concurrent callers:
//! - [`IdentifyVerifier`] runs one request: assertion split, cache lookups,
//!   single-flight locking, identity loading, proof checks, and eager
//!   release of the caller as soon as enough is proven
//! - [`VerificationCache`] keeps the last successful verification per
//!   identity behind a fast and a slow freshness check
//! - [`SingleFlightLockTable`] serialises runs per identity
//! - [`BackgroundIdentifier`] re-verifies a watch list on a backoff schedule
//!
//! Loading identities, checking proofs, tracking statements, and progress
//! notifications are collaborators from `vetted-store`.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod lock_table;
pub mod logging;
pub mod metrics;
pub mod result;
pub mod result_slot;
pub mod scheduler;
pub mod shutdown;
pub mod tracing_spans;
pub mod verifier;

pub use cache::{CacheTtls, TierStats, VerificationCache, VerificationRecord};
pub use config::{EngineConfig, WatchConfig};
pub use context::VerifierContext;
pub use error::{ConfigError, FailureClass, IdentifyError};
pub use lock_table::{NamedLockGuard, SingleFlightLockTable};
pub use logging::{init_logging, LogFormat};
pub use metrics::EngineMetrics;
pub use result::{IdentifyOptions, ProofBreak, ResultSource, VerificationResult};
pub use result_slot::{EagerOrFinal, ResultWaiter, RunOutcome};
pub use scheduler::{BackgroundIdentifier, WatchEvent};
pub use shutdown::ShutdownController;
pub use verifier::{IdentifyVerifier, RunHandle};
