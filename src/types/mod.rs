//! Core domain types.

pub mod ids;
pub mod refs;
pub mod train;

pub use ids::{InvalidSha, IssueIid, ProjectId, Sha};
pub use refs::GitRef;
pub use train::{MergeTrain, MergeTrainItem};
