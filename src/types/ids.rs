//! Identifier types for trains and commits.
//!
//! Project and issue numbers get their own newtypes so the two can never be
//! swapped at a call site; commit ids get a [`Sha`] type whose existence
//! proves the string inside is a well-formed object id.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A forge project identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An issue's project-scoped iid (the number shown in the issue URL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueIid(pub u64);

impl fmt::Display for IssueIid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a string failed to parse as a [`Sha`].
#[derive(Debug, Clone, Error)]
pub enum InvalidSha {
    #[error("expected 40 hex characters, got {0}")]
    WrongLength(usize),

    #[error("not hexadecimal: {0:?}")]
    NotHex(String),
}

/// How many characters of a SHA are shown in tables and log lines.
const SHORT_SHA_LEN: usize = 7;

/// A full git object id: exactly 40 hex characters, held lowercase.
///
/// Mixed-case input is accepted and folded to lowercase on the way in, so two
/// `Sha`s naming the same object always compare equal. [`Sha::parse`] is the
/// only constructor; a value of this type needs no further validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha(String);

impl Sha {
    /// Validates and normalizes a commit id.
    pub fn parse(input: impl Into<String>) -> Result<Self, InvalidSha> {
        let input = input.into();
        if input.len() != 40 {
            return Err(InvalidSha::WrongLength(input.len()));
        }
        if !input.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InvalidSha::NotHex(input));
        }
        Ok(Sha(input.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_SHA_LEN]
    }
}

impl fmt::Display for Sha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Hand-written so that decoding a state block re-validates: a tip message is
// remote input, not trusted data.
impl<'de> Deserialize<'de> for Sha {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Sha::parse(raw).map_err(serde::de::Error::custom)
    }
}
