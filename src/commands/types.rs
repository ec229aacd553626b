//! Command types for the chat-style bot interface.

use std::fmt;

/// A command parsed from an issue comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Add (or refresh) a branch in the issue's merge train.
    Add { branch: String },

    /// Remove a branch from the issue's merge train.
    Remove { branch: String },
}

impl Command {
    /// The branch the command operates on.
    pub fn branch(&self) -> &str {
        match self {
            Command::Add { branch } | Command::Remove { branch } => branch,
        }
    }

    /// The command's name as typed by the user.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add { .. } => "add",
            Command::Remove { .. } => "remove",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name(), self.branch())
    }
}
