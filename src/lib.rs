//! branch-bot — a merge-train bot core.
//!
//! For each tracked issue, the bot maintains an integration branch whose tip
//! is the octopus-style merge of an ordered list of feature branches.
//! Operators post `add <branch>` / `remove <branch>` commands in the issue;
//! the bot recomputes the integration branch, force-pushes it, and reflects
//! the outcome back into the issue.
//!
//! The train's durable state is the integration tip's commit message: there
//! is no side database, so deleting the local clone and restarting rebuilds
//! everything from the remote.

#[cfg(test)]
pub mod test_utils;

pub mod commands;
pub mod git;
pub mod message;
pub mod operator;
pub mod types;
pub mod view;
