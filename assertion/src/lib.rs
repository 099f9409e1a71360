//! Identity assertions.
//!
//! An assertion is a boolean expression over proof factors such as
//! `alice@twitter+alice.example.com@dns`. Before verification it is split
//! once into a *local* part, checkable from already-loaded identity data
//! (username, id, PGP fingerprints), and a *remote* part that needs live
//! proof checks. The [`ProofSetMatcher`] evaluates the remote part
//! incrementally while proof results stream in.

pub mod error;
pub mod expr;
pub mod matcher;
pub mod parse;
pub mod proof_set;
pub mod set;

pub use error::AssertionError;
pub use expr::{AssertionExpression, AssertionUrl, FactorKind};
pub use matcher::{PartialMatch, ProofSetMatcher};
pub use parse::{parse, parse_url};
pub use proof_set::ProofSet;
pub use set::{AssertionAnd, AssertionSet};
