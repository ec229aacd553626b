//! Commit-message state block encoding and decoding.
//!
//! The integration branch's tip commit message is the train's only durable
//! store. The serialized [`MergeTrain`](crate::types::MergeTrain) is embedded
//! between stable HTML-comment markers so the branch stays self-describing
//! and the bot can rebuild all state from the remote alone.

pub mod format;
pub mod parse;

pub use format::format_tip_message;
pub use parse::{ParseError, parse_tip_message};

/// The marker that begins a state block.
pub const STATE_BLOCK_BEGIN: &str = "<!-- branch-bot-state:begin -->";

/// The marker that ends a state block.
pub const STATE_BLOCK_END: &str = "<!-- branch-bot-state:end -->";
