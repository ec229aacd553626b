//! Resolved git references.

use std::fmt;
use thiserror::Error;

use super::ids::Sha;

/// Error returned when constructing a `GitRef` with an empty name.
#[derive(Debug, Clone, Error)]
#[error("git ref name must not be empty")]
pub struct EmptyRefName;

/// A resolved reference: a symbolic branch name paired with the commit it
/// pointed at when it was resolved.
///
/// Immutable once constructed; re-resolve rather than mutate when a branch
/// moves.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitRef {
    name: String,
    commit: Sha,
}

impl GitRef {
    /// Creates a resolved reference. The name must be non-empty.
    pub fn new(name: impl Into<String>, commit: Sha) -> Result<Self, EmptyRefName> {
        let name = name.into();
        if name.is_empty() {
            return Err(EmptyRefName);
        }
        Ok(GitRef { name, commit })
    }

    /// The symbolic branch name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The commit the name resolved to.
    pub fn commit(&self) -> &Sha {
        &self.commit
    }
}

impl fmt::Display for GitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.commit.short())
    }
}
