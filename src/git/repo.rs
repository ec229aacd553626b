//! The working repository handle.
//!
//! One [`Repo`] wraps one local clone with push access to the remote. Merges
//! check out commits in detached HEAD mode inside this clone's working tree,
//! so all mutating access must be serialized by the caller (the registry puts
//! the `Repo` behind the process-wide worktree lock).

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{GitRef, Sha};

use super::{
    CommitIdentity, DEFAULT_COMMAND_TIMEOUT, GitError, GitResult, git_commit_command,
    output_with_timeout, run_git, run_git_stdout,
};

/// A local clone of the project repository.
#[derive(Debug)]
pub struct Repo {
    path: PathBuf,
    remote: String,
    identity: CommitIdentity,
    command_timeout: Duration,
}

impl Repo {
    /// Opens an existing clone, validating that the path is a git work tree.
    pub fn open(path: impl Into<PathBuf>, identity: CommitIdentity) -> GitResult<Self> {
        let path = path.into();

        let inside =
            run_git_stdout(&path, &["rev-parse", "--is-inside-work-tree"], DEFAULT_COMMAND_TIMEOUT)
                .map_err(|_| GitError::NotARepository {
                    path: path.display().to_string(),
                })?;
        if inside != "true" {
            return Err(GitError::NotARepository {
                path: path.display().to_string(),
            });
        }

        Ok(Repo {
            path,
            remote: "origin".to_string(),
            identity,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        })
    }

    /// Overrides the remote name (default `origin`).
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Overrides the per-command deadline.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Path of the working tree.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn identity(&self) -> &CommitIdentity {
        &self.identity
    }

    pub(crate) fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    pub(crate) fn run(&self, args: &[&str]) -> GitResult<String> {
        run_git_stdout(&self.path, args, self.command_timeout)
    }

    /// Resolve any local ref or commit-ish to a commit SHA.
    pub fn rev_parse(&self, rev: &str) -> GitResult<Sha> {
        let spec = format!("{rev}^{{commit}}");
        let args: [&str; 4] = ["rev-parse", "--verify", "--quiet", spec.as_str()];
        let output = output_with_timeout(
            super::git_command(&self.path),
            &args,
            self.command_timeout,
        )?;

        if !output.status.success() {
            return Err(GitError::RefNotFound {
                refspec: rev.to_string(),
            });
        }

        let sha_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Sha::parse(&sha_str).map_err(|_| GitError::InvalidSha(sha_str))
    }

    /// Check if `potential_ancestor` is an ancestor of `descendant`.
    pub fn is_ancestor(&self, potential_ancestor: &Sha, descendant: &Sha) -> GitResult<bool> {
        super::is_ancestor(
            &self.path,
            potential_ancestor,
            descendant,
            self.command_timeout,
        )
    }

    /// Fetch one branch from the remote and return the resolved ref.
    pub fn fetch_branch(&self, branch: &str) -> GitResult<GitRef> {
        run_git(
            &self.path,
            &["fetch", &self.remote, branch],
            self.command_timeout,
        )
        .map_err(|e| match e {
            GitError::CommandFailed { stderr, .. }
                if stderr.contains("couldn't find remote ref") =>
            {
                GitError::RefNotFound {
                    refspec: branch.to_string(),
                }
            }
            other => other,
        })?;

        let commit = self.rev_parse("FETCH_HEAD")?;
        GitRef::new(branch, commit).map_err(|_| GitError::RefNotFound {
            refspec: branch.to_string(),
        })
    }

    /// Read the full commit message at the tip of a local branch.
    pub fn read_tip_message(&self, branch: &str) -> GitResult<String> {
        let tip = self.rev_parse(&format!("refs/heads/{branch}"))?;
        let output = run_git(
            &self.path,
            &["show", "--no-patch", "--format=%B", tip.as_str()],
            self.command_timeout,
        )?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Create or overwrite `branch` with a commit whose tree and parents equal
    /// those of `commit` but whose message is `message`.
    ///
    /// This is how the serialized train is stamped onto the integration tip:
    /// the octopus result keeps its merge parents, only the message changes.
    pub fn write_branch(&self, branch: &str, commit: &Sha, message: &str) -> GitResult<Sha> {
        let tree = self.run(&["rev-parse", &format!("{}^{{tree}}", commit)])?;
        let parents = self.parents_of(commit)?;

        let mut args: Vec<String> = vec!["commit-tree".to_string(), tree];
        for parent in &parents {
            args.push("-p".to_string());
            args.push(parent.as_str().to_string());
        }
        args.push("-m".to_string());
        args.push(message.to_string());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = output_with_timeout(
            git_commit_command(&self.path, &self.identity),
            &arg_refs,
            self.command_timeout,
        )?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: "git commit-tree".to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let sha_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let new_commit = Sha::parse(&sha_str).map_err(|_| GitError::InvalidSha(sha_str))?;

        self.run(&[
            "update-ref",
            &format!("refs/heads/{branch}"),
            new_commit.as_str(),
        ])?;

        tracing::debug!(branch, commit = %new_commit.short(), "stamped integration branch");
        Ok(new_commit)
    }

    /// Get the parent SHA(s) of a commit.
    pub fn parents_of(&self, commit: &Sha) -> GitResult<Vec<Sha>> {
        let output = self.run(&["rev-parse", &format!("{}^@", commit)])?;
        if output.is_empty() {
            return Ok(vec![]);
        }
        output
            .lines()
            .map(|line| Sha::parse(line).map_err(|_| GitError::InvalidSha(line.to_string())))
            .collect()
    }

    /// Force-push a local branch to the remote.
    pub fn push_force(&self, branch: &str) -> GitResult<()> {
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let args: [&str; 4] = ["push", "--force", self.remote.as_str(), refspec.as_str()];
        let output = output_with_timeout(
            super::git_command(&self.path),
            &args,
            self.command_timeout,
        )?;

        if output.status.success() {
            tracing::info!(branch, "force-pushed integration branch");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if stderr.contains("rejected") || stderr.contains("failed to push") {
            return Err(GitError::PushRejected { details: stderr });
        }
        Err(GitError::CommandFailed {
            command: format!("git push --force {} {}", self.remote, refspec),
            stderr,
        })
    }

    /// Resolve a branch on the remote without fetching it.
    ///
    /// Returns `None` if the branch doesn't exist remotely.
    pub fn remote_ref(&self, branch: &str) -> GitResult<Option<Sha>> {
        let output = self.run(&[
            "ls-remote",
            &self.remote,
            &format!("refs/heads/{branch}"),
        ])?;

        let line = output.trim();
        if line.is_empty() {
            return Ok(None);
        }

        // Format: "SHA\trefs/heads/branch"
        let sha_str = line.split('\t').next().unwrap_or("");
        Sha::parse(sha_str)
            .map(Some)
            .map_err(|_| GitError::InvalidSha(sha_str.to_string()))
    }

    /// Delete a branch on the remote (and the local copy, if any).
    ///
    /// Idempotent: deleting a branch that is already absent remotely succeeds.
    pub fn delete_remote(&self, branch: &str) -> GitResult<()> {
        if self.remote_ref(branch)?.is_some() {
            self.run(&["push", &self.remote, "--delete", branch])?;
            tracing::info!(branch, "deleted remote integration branch");
        }

        // Drop the local ref too so a later read_tip_message sees absence.
        let _ = self.run(&["update-ref", "-d", &format!("refs/heads/{branch}")]);
        Ok(())
    }

    /// Abandon any in-progress merge and restore a clean detached worktree.
    ///
    /// Called before every merge sequence and after any failed or timed-out
    /// subprocess that may have left the index dirty.
    pub fn reset_worktree(&self) -> GitResult<()> {
        // Best effort: there may be no merge in progress.
        let _ = self.run(&["merge", "--abort"]);
        self.run(&["reset", "--hard", "HEAD"])?;
        Ok(())
    }

    /// Check out a commit in detached HEAD mode, discarding local changes.
    pub fn checkout_detached(&self, commit: &Sha) -> GitResult<()> {
        self.run(&["checkout", "--force", "--detach", commit.as_str()])?;
        Ok(())
    }
}
