//! The per-train coordinator.
//!
//! A [`MergeTrainOperator`] owns one train's in-memory state and drives
//! mutations against the shared working repository. Mutations are prepared
//! (merged and stamped) against a candidate member list first; the in-memory
//! train is only updated once every fallible step has succeeded, so any
//! failure leaves `members` bitwise unchanged and the next operation retries
//! from the last-known-good state.
//!
//! Callers obtain operators from the [`registry`] behind a per-train lock;
//! the shared repository sits behind the process-wide worktree lock, which
//! each operation acquires for the duration of its git work and releases
//! before returning.

pub mod registry;

use std::sync::{Arc, Mutex, PoisonError};

use thiserror::Error;

use crate::git::merge::{MergeError, octopus_merge};
use crate::git::{GitError, GitResult, MergeConflict, Repo};
use crate::message::format_tip_message;
use crate::types::{GitRef, MergeTrain, MergeTrainItem, Sha};
use crate::view::{TrainView, ViewError, ViewHelper};

pub use registry::OperatorRegistry;

/// Where the base commit for recomputations comes from.
///
/// The integration tip is never used as the base for the next merge; every
/// recomputation starts over from here.
#[derive(Debug, Clone)]
pub enum BaseSpec {
    /// Resolve a branch at operation time (typically the default branch).
    Branch(String),

    /// A fixed commit.
    Pinned(Sha),
}

impl BaseSpec {
    fn resolve(&self, repo: &Repo) -> GitResult<GitRef> {
        match self {
            BaseSpec::Branch(name) => {
                let commit = repo.rev_parse(name)?;
                GitRef::new(name.clone(), commit).map_err(|_| GitError::RefNotFound {
                    refspec: name.clone(),
                })
            }
            BaseSpec::Pinned(sha) => Ok(GitRef::new(sha.as_str(), sha.clone())
                .expect("a SHA is never an empty ref name")),
        }
    }
}

/// A failed train operation.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// `remove` was asked for a branch that is not a member.
    #[error("branch {branch} is not a member of the merge train")]
    NotFound { branch: String },

    /// The recomputation hit a merge conflict; the report names the colliding
    /// branches. Never retried automatically.
    #[error("merge conflict involving {}", .0.conflict_branches.join(", "))]
    Conflict(MergeConflict),

    /// Subprocess or network failure (timeout, rejected push, fetch error).
    /// The in-memory state is untouched; the next operation will converge.
    #[error("transient git failure: {0}")]
    Transient(#[from] GitError),
}

impl From<MergeError> for OperatorError {
    fn from(err: MergeError) -> Self {
        match err {
            MergeError::Conflict(report) => OperatorError::Conflict(report),
            MergeError::Git(err) => OperatorError::Transient(err),
        }
    }
}

impl OperatorError {
    /// Renders the failure for posting back to the issue.
    pub fn as_markdown(&self) -> String {
        match self {
            OperatorError::Conflict(report) => report.as_markdown(),
            other => format!("**Operation failed**\n\n{other}"),
        }
    }
}

/// Outcome of a successful `remove`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The train still has members; the integration tip moved here.
    Updated(GitRef),

    /// The removed member was the last one. The train is empty and the
    /// integration branch is to be (or, via [`MergeTrainOperator::remove_and_push`],
    /// has been) deleted remotely.
    Deleted,
}

/// A prepared-but-uncommitted mutation: the stamped tip and the member list
/// that will become current once the caller decides the operation succeeded.
struct Prepared {
    members: Vec<MergeTrainItem>,
    tip: GitRef,
}

/// Stateful coordinator for one merge train.
pub struct MergeTrainOperator {
    train: MergeTrain,
    repo: Arc<Mutex<Repo>>,
    base: BaseSpec,
}

impl MergeTrainOperator {
    /// Creates an operator around existing state. Use the registry's
    /// [`OperatorRegistry::load`] in production code.
    pub fn new(train: MergeTrain, repo: Arc<Mutex<Repo>>, base: BaseSpec) -> Self {
        MergeTrainOperator { train, repo, base }
    }

    /// The current in-memory train state.
    pub fn train(&self) -> &MergeTrain {
        &self.train
    }

    /// Adds a branch to the train (or refreshes it, moving it to the end),
    /// recomputes the integration branch, and stamps the new state locally.
    ///
    /// The caller must have fetched `r.commit()` into the clone already.
    /// Returns the new integration tip. On any failure the in-memory members
    /// are unchanged.
    pub fn add(&mut self, r: &GitRef) -> Result<GitRef, OperatorError> {
        tracing::info!(
            branch = r.name(),
            tip = %r.commit().short(),
            train = %self.train.branch_name,
            "adding branch to merge train"
        );
        let prepared = self.prepare(self.train.candidate_with(r))?;
        self.train.members = prepared.members;
        Ok(prepared.tip)
    }

    /// [`add`](Self::add), then force-push the integration branch. A push
    /// failure leaves the in-memory members unchanged.
    pub fn add_and_push(&mut self, r: &GitRef) -> Result<GitRef, OperatorError> {
        tracing::info!(
            branch = r.name(),
            tip = %r.commit().short(),
            train = %self.train.branch_name,
            "adding branch to merge train"
        );
        let prepared = self.prepare(self.train.candidate_with(r))?;
        self.lock_repo().push_force(&self.train.branch_name)?;
        self.train.members = prepared.members;
        Ok(prepared.tip)
    }

    /// Removes a branch from the train and recomputes the integration branch
    /// from the remainder.
    ///
    /// Removing the last member returns [`RemoveOutcome::Deleted`] and clears
    /// the in-memory state; the caller is expected to delete the remote
    /// branch (or use [`remove_and_push`](Self::remove_and_push)).
    pub fn remove(&mut self, branch: &str) -> Result<RemoveOutcome, OperatorError> {
        tracing::info!(
            branch,
            train = %self.train.branch_name,
            "removing branch from merge train"
        );
        let candidate = self
            .train
            .candidate_without(branch)
            .ok_or_else(|| OperatorError::NotFound {
                branch: branch.to_string(),
            })?;

        if candidate.is_empty() {
            self.train.members.clear();
            return Ok(RemoveOutcome::Deleted);
        }

        // Removing one member can expose latent conflicts between the rest;
        // those are reported without mutating state.
        let prepared = self.prepare(candidate)?;
        self.train.members = prepared.members;
        Ok(RemoveOutcome::Updated(prepared.tip))
    }

    /// [`remove`](Self::remove), then force-push the recomputed integration
    /// branch — or delete it remotely when the train became empty. A push or
    /// delete failure leaves the in-memory members unchanged.
    pub fn remove_and_push(&mut self, branch: &str) -> Result<RemoveOutcome, OperatorError> {
        tracing::info!(
            branch,
            train = %self.train.branch_name,
            "removing branch from merge train"
        );
        let candidate = self
            .train
            .candidate_without(branch)
            .ok_or_else(|| OperatorError::NotFound {
                branch: branch.to_string(),
            })?;

        if candidate.is_empty() {
            self.lock_repo().delete_remote(&self.train.branch_name)?;
            self.train.members.clear();
            return Ok(RemoveOutcome::Deleted);
        }

        let prepared = self.prepare(candidate)?;
        self.lock_repo().push_force(&self.train.branch_name)?;
        self.train.members = prepared.members;
        Ok(RemoveOutcome::Updated(prepared.tip))
    }

    /// Renders the current member table (plus the last failure, if any) and
    /// hands it to the injected forge-side view helper.
    pub fn sync_view(
        &self,
        helper: &dyn ViewHelper,
        last_failure: Option<&OperatorError>,
    ) -> Result<(), ViewError> {
        let view = TrainView::new(&self.train, last_failure.map(OperatorError::as_markdown));
        helper.sync(&view)
    }

    /// Recompute the integration branch for a candidate member list and stamp
    /// the encoded state onto it, without touching `self.train`.
    fn prepare(&self, candidate: Vec<GitRef>) -> Result<Prepared, OperatorError> {
        let repo = self.lock_repo();

        let base = self.base.resolve(&repo)?;
        let outcome = octopus_merge(&repo, &base, &candidate)?;

        let members: Vec<MergeTrainItem> = outcome
            .members
            .into_iter()
            .map(|m| MergeTrainItem {
                branch: m.branch,
                tip: m.tip,
                merged_commit: m.merged_commit,
            })
            .collect();

        let mut stamped = self.train.clone();
        stamped.members = members;

        // The stamp replaces the final merge commit (same tree and parents,
        // new message), so the last member's merged_commit records the
        // pre-stamp commit — the encoded state cannot contain the stamp's own
        // SHA. Decoding the tip therefore always reproduces `members` exactly.
        let message = format_tip_message(&stamped);
        let tip_commit = repo.write_branch(&self.train.branch_name, &outcome.tip, &message)?;

        let tip = GitRef::new(self.train.branch_name.clone(), tip_commit)
            .expect("integration branch names are never empty");

        Ok(Prepared {
            members: stamped.members,
            tip,
        })
    }

    /// Acquire the process-wide worktree lock.
    ///
    /// A poisoned lock is recovered rather than propagated: the worktree is
    /// reset at the start of every merge sequence, so state left by a panicked
    /// holder cannot leak into the next operation.
    fn lock_repo(&self) -> std::sync::MutexGuard<'_, Repo> {
        self.repo.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
