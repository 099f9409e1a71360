//! Local/remote split of an assertion expression.

use serde::{Deserialize, Serialize};
use std::fmt;

use vetted_types::ProofFact;

use crate::{parse, AssertionError, AssertionExpression, AssertionUrl, ProofSet};

/// A flat conjunction of factors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionAnd {
    factors: Vec<AssertionUrl>,
}

impl AssertionAnd {
    pub fn new(factors: Vec<AssertionUrl>) -> Self {
        Self { factors }
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factors(&self) -> &[AssertionUrl] {
        &self.factors
    }

    /// Every factor is satisfied by a confirmed fact in `ps`.
    pub fn match_set(&self, ps: &ProofSet) -> bool {
        self.factors.iter().all(|f| f.match_set(ps))
    }

    /// Some factor is named by `fact`, whatever the fact's state.
    pub fn has_factor(&self, fact: &ProofFact) -> bool {
        self.factors.iter().any(|f| f.names(fact))
    }
}

impl fmt::Display for AssertionAnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, factor) in self.factors.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{factor}")?;
        }
        Ok(())
    }
}

/// An immutable assertion, partitioned once into its local and remote parts.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionSet {
    expression: Option<AssertionExpression>,
    local: AssertionAnd,
    remote: AssertionAnd,
}

impl AssertionSet {
    /// The empty assertion: every identity satisfies it.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse an assertion string. Empty or whitespace-only input yields the
    /// empty assertion.
    pub fn parse(s: &str) -> Result<Self, AssertionError> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        Self::from_expression(parse(s)?)
    }

    /// Split an already-parsed expression. Only conjunctions are accepted.
    pub fn from_expression(expression: AssertionExpression) -> Result<Self, AssertionError> {
        if expression.has_or() {
            return Err(AssertionError::OrNotAllowed(expression.to_string()));
        }
        let (remote, local): (Vec<_>, Vec<_>) = expression
            .collect_urls()
            .into_iter()
            .cloned()
            .partition(AssertionUrl::is_remote);
        Ok(Self {
            expression: Some(expression),
            local: AssertionAnd::new(local),
            remote: AssertionAnd::new(remote),
        })
    }

    pub fn expression(&self) -> Option<&AssertionExpression> {
        self.expression.as_ref()
    }

    pub fn local(&self) -> &AssertionAnd {
        &self.local
    }

    pub fn remote(&self) -> &AssertionAnd {
        &self.remote
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }

    pub fn has_remote(&self) -> bool {
        !self.remote.is_empty()
    }
}

impl fmt::Display for AssertionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expr) => write!(f, "{expr}"),
            None => Ok(()),
        }
    }
}
