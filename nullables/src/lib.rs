//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the engine (clock, directory, proof checker,
//! tracking store, notification sink) is abstracted behind a trait. This
//! crate provides test-friendly implementations that:
//! - Return deterministic, scripted values
//! - Can be controlled programmatically (advance time, hold a proof check)
//! - Record how they were called, for assertions
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod clock;
pub mod proof;
pub mod sink;
pub mod store;

pub use clock::NullClock;
pub use proof::{CheckCall, NullProofChecker};
pub use sink::{RecordingSink, SinkEvent};
pub use store::{NullDirectory, NullTrackStore};
