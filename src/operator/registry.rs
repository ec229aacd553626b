//! Process-owned operator registry.
//!
//! The registry is the only place operators come from in production code. It
//! owns the process-wide worktree lock (the shared [`Repo`] behind a mutex)
//! and a cache of live operators, each behind its own per-train lock, so
//! mutations on one train serialize while distinct trains only contend on the
//! working tree itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::git::{GitError, GitResult, Repo};
use crate::message::parse_tip_message;
use crate::types::{IssueIid, MergeTrain, ProjectId};

use super::{BaseSpec, MergeTrainOperator};

/// Registry of live operators for one working repository.
pub struct OperatorRegistry {
    repo: Arc<Mutex<Repo>>,
    base: BaseSpec,
    operators: Mutex<HashMap<(ProjectId, IssueIid), Arc<Mutex<MergeTrainOperator>>>>,
}

impl OperatorRegistry {
    /// Creates a registry around a working clone and a base spec shared by
    /// all trains.
    pub fn new(repo: Repo, base: BaseSpec) -> Self {
        OperatorRegistry {
            repo: Arc::new(Mutex::new(repo)),
            base,
            operators: Mutex::new(HashMap::new()),
        }
    }

    /// Handle to the shared repository (the worktree lock).
    pub fn repo(&self) -> Arc<Mutex<Repo>> {
        Arc::clone(&self.repo)
    }

    /// Returns the live operator for `(project, issue)`, rehydrating it from
    /// the integration branch's tip if one exists.
    ///
    /// A missing branch, a tip without a state block, or a state block that
    /// identifies a different train all yield a fresh empty operator: remote
    /// state the bot does not recognize is treated as absent, never
    /// overwritten without a later explicit mutation.
    pub fn load(
        &self,
        branch_name: &str,
        project: ProjectId,
        issue: IssueIid,
    ) -> GitResult<Arc<Mutex<MergeTrainOperator>>> {
        let mut operators = self
            .operators
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(operator) = operators.get(&(project, issue)) {
            return Ok(Arc::clone(operator));
        }

        let train = self.rehydrate(branch_name, project, issue)?;
        let operator = Arc::new(Mutex::new(MergeTrainOperator::new(
            train,
            Arc::clone(&self.repo),
            self.base.clone(),
        )));
        operators.insert((project, issue), Arc::clone(&operator));
        Ok(operator)
    }

    fn rehydrate(
        &self,
        branch_name: &str,
        project: ProjectId,
        issue: IssueIid,
    ) -> GitResult<MergeTrain> {
        let repo = self.repo.lock().unwrap_or_else(PoisonError::into_inner);

        let message = match repo.read_tip_message(branch_name) {
            Ok(message) => message,
            Err(GitError::RefNotFound { .. }) => {
                tracing::debug!(branch = branch_name, "no integration branch, starting empty");
                return Ok(MergeTrain::empty(project, issue, branch_name));
            }
            Err(other) => return Err(other),
        };

        match parse_tip_message(&message, project, issue, branch_name) {
            Ok(train) => {
                tracing::info!(
                    branch = branch_name,
                    members = train.members.len(),
                    "rehydrated merge train from integration tip"
                );
                Ok(train)
            }
            Err(err) => {
                tracing::warn!(
                    branch = branch_name,
                    error = %err,
                    "integration tip carries no usable state, starting empty"
                );
                Ok(MergeTrain::empty(project, issue, branch_name))
            }
        }
    }
}
