//! The parsed assertion tree.

use serde::{Deserialize, Serialize};
use std::fmt;

use vetted_types::ProofFact;

use crate::ProofSet;

/// What kind of proof a factor names, which decides how it is matched and
/// whether it is local or remote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorKind {
    /// A username on this directory.
    Keybase,
    /// A hex identity id.
    Uid,
    /// A PGP key fingerprint (suffix match).
    Fingerprint,
    /// A web proof on any of `dns`, `http`, `https`.
    Web,
    /// A web proof on `http` or `https`.
    Http,
    Https,
    Dns,
    /// Any third-party social service (`twitter`, `github`, ...).
    Social,
}

impl FactorKind {
    /// Remote factors need a live proof check; local ones are answered by
    /// the identity's base facts.
    pub fn is_remote(&self) -> bool {
        !matches!(self, Self::Keybase | Self::Uid | Self::Fingerprint)
    }
}

/// A single named factor, e.g. `alice@twitter`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssertionUrl {
    pub kind: FactorKind,
    pub key: String,
    pub value: String,
}

impl AssertionUrl {
    pub fn new(kind: FactorKind, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into().to_lowercase(),
            value: value.into().to_lowercase(),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.kind.is_remote()
    }

    /// Proof-set keys this factor can be satisfied by.
    pub fn keys(&self) -> Vec<&str> {
        match self.kind {
            FactorKind::Web => vec!["dns", "http", "https"],
            FactorKind::Http => vec!["http", "https"],
            _ => vec![self.key.as_str()],
        }
    }

    /// Whether `fact` names this factor, regardless of the fact's state.
    pub fn names(&self, fact: &ProofFact) -> bool {
        if !self.keys().contains(&fact.key.as_str()) {
            return false;
        }
        match self.kind {
            // Fingerprints match on any suffix of the full fingerprint.
            FactorKind::Fingerprint => fact.value.ends_with(&self.value),
            _ => fact.value == self.value,
        }
    }

    /// Whether a confirmed fact in `ps` satisfies this factor.
    pub fn match_set(&self, ps: &ProofSet) -> bool {
        ps.get(&self.keys())
            .any(|fact| fact.state.is_confirmed() && self.names(fact))
    }
}

impl fmt::Display for AssertionUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FactorKind::Keybase => write!(f, "{}", self.value),
            _ => write!(f, "{}@{}", self.value, self.key),
        }
    }
}

/// Boolean expression over [`AssertionUrl`] factors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssertionExpression {
    Url(AssertionUrl),
    And(Vec<AssertionExpression>),
    Or(Vec<AssertionExpression>),
}

impl AssertionExpression {
    pub fn match_set(&self, ps: &ProofSet) -> bool {
        match self {
            Self::Url(url) => url.match_set(ps),
            Self::And(factors) => factors.iter().all(|f| f.match_set(ps)),
            Self::Or(terms) => terms.iter().any(|t| t.match_set(ps)),
        }
    }

    pub fn has_or(&self) -> bool {
        match self {
            Self::Url(_) => false,
            Self::Or(_) => true,
            Self::And(factors) => factors.iter().any(|f| f.has_or()),
        }
    }

    /// Every factor in the tree, left to right.
    pub fn collect_urls(&self) -> Vec<&AssertionUrl> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into<'a>(&'a self, out: &mut Vec<&'a AssertionUrl>) {
        match self {
            Self::Url(url) => out.push(url),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_into(out);
                }
            }
        }
    }
}

impl fmt::Display for AssertionExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::And(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        f.write_str("+")?;
                    }
                    match factor {
                        Self::Or(_) => write!(f, "({factor})")?,
                        _ => write!(f, "{factor}")?,
                    }
                }
                Ok(())
            }
            Self::Or(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{term}")?;
                }
                Ok(())
            }
        }
    }
}
