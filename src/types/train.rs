//! Merge train state: the ordered member list for one issue's integration branch.

use serde::{Deserialize, Serialize};

use super::ids::{IssueIid, ProjectId, Sha};
use super::refs::GitRef;

/// One member of a merge train.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeTrainItem {
    /// The source branch name. Unique within a train.
    pub branch: String,

    /// The commit on that branch that was merged.
    pub tip: Sha,

    /// The merge commit produced when this member was incorporated into the
    /// octopus sequence. Always an ancestor of the integration tip.
    pub merged_commit: Sha,
}

/// The persistent state of one issue's merge train.
///
/// `members` is kept in merge order: the first member is merged onto the base
/// first. The authoritative copy of this struct lives in the integration
/// branch's tip commit message; the in-memory copy held by an operator mirrors
/// the most recently stamped state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeTrain {
    pub project_id: ProjectId,
    pub issue_iid: IssueIid,

    /// The integration branch this train is stamped onto (e.g. `bb-branches/456`).
    pub branch_name: String,

    pub members: Vec<MergeTrainItem>,
}

impl MergeTrain {
    /// Creates an empty train for the given identifying tuple.
    pub fn empty(
        project_id: ProjectId,
        issue_iid: IssueIid,
        branch_name: impl Into<String>,
    ) -> Self {
        MergeTrain {
            project_id,
            issue_iid,
            branch_name: branch_name.into(),
            members: Vec::new(),
        }
    }

    /// Looks up a member by branch name.
    pub fn member(&self, branch: &str) -> Option<&MergeTrainItem> {
        self.members.iter().find(|m| m.branch == branch)
    }

    /// Returns the member refs in merge order, as inputs to a recomputation.
    pub fn member_refs(&self) -> Vec<GitRef> {
        self.members
            .iter()
            .map(|m| {
                GitRef::new(m.branch.clone(), m.tip.clone())
                    .expect("train members always carry non-empty branch names")
            })
            .collect()
    }

    /// Builds the candidate member-ref list for adding (or refreshing) `r`.
    ///
    /// Any existing member with the same branch is dropped and the new ref is
    /// appended, so a re-add refreshes the tip and demotes the branch to the
    /// most-recently-added slot.
    pub fn candidate_with(&self, r: &GitRef) -> Vec<GitRef> {
        let mut refs: Vec<GitRef> = self
            .member_refs()
            .into_iter()
            .filter(|m| m.name() != r.name())
            .collect();
        refs.push(r.clone());
        refs
    }

    /// Builds the candidate member-ref list with `branch` filtered out,
    /// preserving the order of the rest. Returns `None` if `branch` is not a
    /// member.
    pub fn candidate_without(&self, branch: &str) -> Option<Vec<GitRef>> {
        self.member(branch)?;
        Some(
            self.member_refs()
                .into_iter()
                .filter(|m| m.name() != branch)
                .collect(),
        )
    }
}
