//! Local git operations for the merge train.
//!
//! Everything here drives the `git` binary against a single local clone. All
//! commands run with config isolation (no system or user config, no terminal
//! prompts) and a per-call deadline; commit identity is supplied per-command
//! via `-c` flags so no persistent `.git/config` changes are required.

pub mod merge;
pub mod repo;

use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use thiserror::Error;
use wait_timeout::ChildExt;

use crate::types::Sha;

pub use merge::{FailedFile, MergeConflict, MergeError, MergedMember, OctopusOutcome};
pub use repo::Repo;

/// Default deadline for a single git subprocess call.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from git operations.
///
/// Everything except [`GitError::RefNotFound`] is transient from the
/// operator's point of view: the in-memory train is left untouched and the
/// next operation retries from the last-known-good state.
#[derive(Debug, Error)]
pub enum GitError {
    /// Git command failed.
    #[error("git command failed: {command}\nstderr: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// Git command exceeded its deadline and was killed.
    #[error("git command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    /// Push was rejected by the remote.
    #[error("push rejected: {details}")]
    PushRejected { details: String },

    /// A ref could not be resolved (unknown branch, missing commit).
    #[error("ref not found: {refspec}")]
    RefNotFound { refspec: String },

    /// Git produced something that should have been a SHA but was not.
    #[error("invalid SHA: {0}")]
    InvalidSha(String),

    /// The configured path is not a git repository.
    #[error("not a git repository: {path}")]
    NotARepository { path: String },

    /// IO error spawning or reaping a subprocess.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Identity used for creating commits.
///
/// Passed via `-c` flags to git commands, ensuring commits can be created
/// even when global/system git config is disabled.
#[derive(Debug, Clone)]
pub struct CommitIdentity {
    /// The committer/author name (git `user.name`).
    pub name: String,

    /// The committer/author email (git `user.email`).
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        CommitIdentity {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Create a git Command with clean environment (no system/user config).
///
/// Ignoring system and user git configuration (rerere, hooks, aliases) keeps
/// behavior consistent across machines.
pub(crate) fn git_command(workdir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.current_dir(workdir);

    cmd.env("GIT_CONFIG_NOSYSTEM", "1");
    cmd.env("GIT_CONFIG_GLOBAL", "/dev/null");

    // Disable terminal prompts
    cmd.env("GIT_TERMINAL_PROMPT", "0");

    cmd
}

/// Create a git Command configured for commit-creating operations.
///
/// Extends [`git_command`] with identity configuration passed via `-c` flags.
pub(crate) fn git_commit_command(workdir: &Path, identity: &CommitIdentity) -> Command {
    let mut cmd = git_command(workdir);

    cmd.arg("-c");
    cmd.arg(format!("user.name={}", identity.name));
    cmd.arg("-c");
    cmd.arg(format!("user.email={}", identity.email));

    cmd
}

/// Run a prepared git command under a deadline and collect its output.
///
/// On expiry the child is killed and reaped before returning
/// [`GitError::Timeout`]; the exit status of a completed child is NOT
/// inspected here.
pub(crate) fn output_with_timeout(
    mut cmd: Command,
    args: &[&str],
    timeout: Duration,
) -> GitResult<Output> {
    cmd.args(args);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let mut child = cmd.spawn()?;

    let status = child.wait_timeout(timeout)?;
    if status.is_none() {
        let _ = child.kill();
        let _ = child.wait();
        return Err(GitError::Timeout {
            command: format!("git {}", args.join(" ")),
            timeout_secs: timeout.as_secs(),
        });
    }

    Ok(child.wait_with_output()?)
}

/// Run a git command in the given working directory, requiring success.
pub(crate) fn run_git(workdir: &Path, args: &[&str], timeout: Duration) -> GitResult<Output> {
    let output = output_with_timeout(git_command(workdir), args, timeout)?;

    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let command = format!("git {}", args.join(" "));
        Err(GitError::CommandFailed { command, stderr })
    }
}

/// Run a git command and return its trimmed stdout.
pub(crate) fn run_git_stdout(workdir: &Path, args: &[&str], timeout: Duration) -> GitResult<String> {
    let output = run_git(workdir, args, timeout)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check if one commit is an ancestor of another.
pub(crate) fn is_ancestor(
    workdir: &Path,
    potential_ancestor: &Sha,
    descendant: &Sha,
    timeout: Duration,
) -> GitResult<bool> {
    let args = [
        "merge-base",
        "--is-ancestor",
        potential_ancestor.as_str(),
        descendant.as_str(),
    ];
    let output = output_with_timeout(git_command(workdir), &args, timeout)?;

    // Exit 0 = is ancestor, exit 1 = not ancestor, other = error
    match output.status.code() {
        Some(0) => Ok(true),
        Some(1) => Ok(false),
        _ => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(GitError::CommandFailed {
                command: format!(
                    "git merge-base --is-ancestor {} {}",
                    potential_ancestor, descendant
                ),
                stderr,
            })
        }
    }
}
