//! Iterative octopus merge with per-member conflict attribution.
//!
//! The integration tip is recomputed by merging each member onto the base in
//! order, two branches at a time, instead of handing git all N heads at once.
//! A single N-way merge cannot tell the caller *which* members collided; the
//! iterative form records the commit produced for every member and, on
//! failure, attributes each conflicting path to the members that touched it.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{GitRef, Sha};

use super::{GitError, GitResult, Repo, git_commit_command, output_with_timeout};

/// One file that failed to merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    /// Path of the conflicting file, relative to the repository root.
    pub path: String,

    /// Branches whose changes collided on this path, in merge order. The
    /// branch whose merge failed is always the last entry.
    pub conflicting_branches: Vec<String>,
}

/// Structured description of a failed octopus merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    /// Per-path conflict breakdown.
    pub failed_files: Vec<FailedFile>,

    /// Union of all conflicting branches across files, merge order preserved.
    pub conflict_branches: Vec<String>,
}

impl MergeConflict {
    /// Renders the report as markdown for posting back to the issue.
    pub fn as_markdown(&self) -> String {
        let mut out = String::from("**Merge conflict**\n\n");
        out.push_str("| file | conflicting branches |\n");
        out.push_str("|------|----------------------|\n");
        for file in &self.failed_files {
            out.push_str(&format!(
                "| `{}` | {} |\n",
                file.path,
                file.conflicting_branches
                    .iter()
                    .map(|b| format!("`{b}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        out
    }
}

/// Errors from an octopus merge attempt.
#[derive(Debug, Error)]
pub enum MergeError {
    /// Members failed to merge; the report names the colliding branches.
    #[error("merge conflict involving {}", .0.conflict_branches.join(", "))]
    Conflict(MergeConflict),

    /// The merge could not be driven to a verdict (subprocess failure).
    #[error(transparent)]
    Git(#[from] GitError),
}

/// The commit recorded for one member during a successful octopus merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedMember {
    /// The member's branch name.
    pub branch: String,

    /// The member commit that was merged.
    pub tip: Sha,

    /// HEAD after this member was incorporated.
    pub merged_commit: Sha,
}

/// The result of a successful octopus merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OctopusOutcome {
    /// The final integration tip (equals the base commit for an empty member
    /// list).
    pub tip: Sha,

    /// Per-member commits, in merge order.
    pub members: Vec<MergedMember>,
}

/// Octopus-merge `members` onto `base`, in order, in the repo's working tree.
///
/// The worktree is left checked out at the resulting tip on success, and
/// restored to a clean detached state at `base` on conflict. Fast-forwards and
/// already-up-to-date members count as trivially merged; their recorded commit
/// is HEAD after the step.
pub fn octopus_merge(
    repo: &Repo,
    base: &GitRef,
    members: &[GitRef],
) -> Result<OctopusOutcome, MergeError> {
    repo.reset_worktree()?;
    repo.checkout_detached(base.commit())?;

    match merge_members(repo, base, members) {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            // Never leave a half-merged index behind for the next train.
            let _ = repo.reset_worktree();
            let _ = repo.checkout_detached(base.commit());
            Err(err)
        }
    }
}

fn merge_members(
    repo: &Repo,
    base: &GitRef,
    members: &[GitRef],
) -> Result<OctopusOutcome, MergeError> {
    let mut merged: Vec<MergedMember> = Vec::with_capacity(members.len());
    // Paths each successfully merged member changed relative to base, kept in
    // merge order for conflict attribution.
    let mut touched: Vec<(String, HashSet<String>)> = Vec::with_capacity(members.len());

    for member in members {
        let changed = changed_paths(repo, base.commit(), member.commit())?;

        match merge_one(repo, member)? {
            StepResult::Merged => {
                let head = repo.rev_parse("HEAD")?;
                merged.push(MergedMember {
                    branch: member.name().to_string(),
                    tip: member.commit().clone(),
                    merged_commit: head,
                });
                touched.push((member.name().to_string(), changed));
            }
            StepResult::Conflicted { paths } => {
                tracing::warn!(
                    branch = member.name(),
                    files = paths.len(),
                    "merge conflict, aborting octopus sequence"
                );
                return Err(MergeError::Conflict(attribute_conflicts(
                    &touched,
                    member.name(),
                    paths,
                )));
            }
        }
    }

    let tip = match merged.last() {
        Some(last) => last.merged_commit.clone(),
        None => base.commit().clone(),
    };

    Ok(OctopusOutcome { tip, members: merged })
}

enum StepResult {
    Merged,
    Conflicted { paths: Vec<String> },
}

/// Attempt a two-way merge of one member into the current HEAD.
fn merge_one(repo: &Repo, member: &GitRef) -> GitResult<StepResult> {
    let message = format!("Merge branch '{}' into merge train", member.name());
    let args: [&str; 5] = [
        "merge",
        "--no-edit",
        "-m",
        message.as_str(),
        member.commit().as_str(),
    ];

    let output = output_with_timeout(
        git_commit_command(repo.path(), repo.identity()),
        &args,
        repo.command_timeout(),
    )?;

    if output.status.success() {
        return Ok(StepResult::Merged);
    }

    // Git reports conflicts on stdout, other failures on stderr.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = format!("{stdout}{stderr}");
    if combined.contains("CONFLICT") || combined.contains("Automatic merge failed") {
        return Ok(StepResult::Conflicted {
            paths: conflicting_paths(repo)?,
        });
    }

    Err(GitError::CommandFailed {
        command: format!("git merge {}", member.commit()),
        stderr: stderr.to_string(),
    })
}

/// List the paths left in conflicting state by a failed merge.
fn conflicting_paths(repo: &Repo) -> GitResult<Vec<String>> {
    let output = repo.run(&["diff", "--name-only", "--diff-filter=U"])?;
    Ok(output.lines().map(str::to_string).collect())
}

/// List the paths a member's tree changed relative to the base.
fn changed_paths(repo: &Repo, base: &Sha, commit: &Sha) -> GitResult<HashSet<String>> {
    let output = repo.run(&["diff", "--name-only", base.as_str(), commit.as_str()])?;
    Ok(output.lines().map(str::to_string).collect())
}

/// Build the conflict report for a failed step.
///
/// Each conflicting path is attributed to every previously merged member that
/// changed it (in merge order) with the failing branch appended last; the
/// report-level branch list is the merge-order union across paths.
fn attribute_conflicts(
    touched: &[(String, HashSet<String>)],
    failing_branch: &str,
    paths: Vec<String>,
) -> MergeConflict {
    let failed_files: Vec<FailedFile> = paths
        .into_iter()
        .map(|path| {
            let mut conflicting_branches: Vec<String> = touched
                .iter()
                .filter(|(_, changed)| changed.contains(&path))
                .map(|(branch, _)| branch.clone())
                .collect();
            conflicting_branches.push(failing_branch.to_string());
            FailedFile {
                path,
                conflicting_branches,
            }
        })
        .collect();

    let mut conflict_branches: Vec<String> = touched
        .iter()
        .map(|(branch, _)| branch.clone())
        .filter(|branch| {
            failed_files
                .iter()
                .any(|f| f.conflicting_branches.contains(branch))
        })
        .collect();
    conflict_branches.push(failing_branch.to_string());

    MergeConflict {
        failed_files,
        conflict_branches,
    }
}
