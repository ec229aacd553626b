//! Shared test fixtures: temporary git repositories driven by the real `git`
//! binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;

use crate::git::{CommitIdentity, Repo};
use crate::types::{GitRef, Sha};

const TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A throwaway git repository with an initial commit on `main`, optionally
/// backed by a bare `origin` so push and fetch paths can be exercised.
pub struct TestRepo {
    _dir: TempDir,
    work: PathBuf,
    base_commit: Sha,
    has_origin: bool,
}

impl TestRepo {
    /// Creates a local-only repository (no remote).
    pub fn new() -> Self {
        Self::create(false)
    }

    /// Creates a repository with a bare `origin` remote, `main` pushed.
    pub fn with_origin() -> Self {
        Self::create(true)
    }

    fn create(with_origin: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        std::fs::create_dir_all(&work).unwrap();

        git(&work, &["init"]);
        git(&work, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&work, &["config", "user.name", "Test"]);
        git(&work, &["config", "user.email", "test@test.com"]);

        std::fs::write(work.join("README.md"), "# Test Repo\n").unwrap();
        git(&work, &["add", "README.md"]);
        git(&work, &["commit", "-m", "Initial commit"]);

        let base_commit = Sha::parse(git_stdout(&work, &["rev-parse", "HEAD"])).unwrap();

        if with_origin {
            let origin = dir.path().join("origin.git");
            std::fs::create_dir_all(&origin).unwrap();
            git(&origin, &["init", "--bare"]);
            git(&work, &["remote", "add", "origin", origin.to_str().unwrap()]);
            git(&work, &["push", "origin", "main"]);
        }

        TestRepo {
            _dir: dir,
            work,
            base_commit,
            has_origin: with_origin,
        }
    }

    /// Opens a [`Repo`] handle on the working clone.
    pub fn repo(&self) -> Repo {
        Repo::open(&self.work, CommitIdentity::new("Test", "test@test.com"))
            .unwrap()
            .with_command_timeout(TEST_TIMEOUT)
    }

    /// The initial commit, as the train's base ref.
    pub fn base(&self) -> GitRef {
        GitRef::new("main", self.base_commit.clone()).unwrap()
    }

    /// Creates a branch at `base` with one committed file and returns its ref.
    pub fn create_branch(&self, base: &GitRef, name: &str, file: &str, content: &str) -> GitRef {
        git(&self.work, &["checkout", "-B", name, base.commit().as_str()]);
        std::fs::write(self.work.join(file), content).unwrap();
        git(&self.work, &["add", file]);
        git(&self.work, &["commit", "-m", &format!("Add {file}")]);

        let commit = Sha::parse(git_stdout(&self.work, &["rev-parse", "HEAD"])).unwrap();
        GitRef::new(name, commit).unwrap()
    }

    /// Commits new content for a file on an existing branch and returns the
    /// refreshed ref.
    pub fn update_branch(&self, name: &str, file: &str, content: &str) -> GitRef {
        git(&self.work, &["checkout", name]);
        std::fs::write(self.work.join(file), content).unwrap();
        git(&self.work, &["add", file]);
        git(&self.work, &["commit", "-m", &format!("Update {file}")]);

        let commit = Sha::parse(git_stdout(&self.work, &["rev-parse", "HEAD"])).unwrap();
        GitRef::new(name, commit).unwrap()
    }

    /// Pushes a branch to origin.
    pub fn push(&self, branch: &str) {
        assert!(self.has_origin, "TestRepo::with_origin required for push");
        git(&self.work, &["push", "--force", "origin", branch]);
    }

    /// Resolves a branch on origin, as a forge-side helper would.
    pub fn origin_ref(&self, branch: &str) -> Option<GitRef> {
        assert!(self.has_origin, "TestRepo::with_origin required for origin_ref");
        let output = git_stdout(
            &self.work,
            &["ls-remote", "origin", &format!("refs/heads/{branch}")],
        );
        let sha_str = output.split('\t').next()?.trim();
        if sha_str.is_empty() {
            return None;
        }
        GitRef::new(branch, Sha::parse(sha_str).unwrap()).ok()
    }

    /// Lists all file paths in a commit's tree.
    pub fn files_at(&self, commit: &Sha) -> Vec<String> {
        git_stdout(
            &self.work,
            &["ls-tree", "-r", "--name-only", commit.as_str()],
        )
        .lines()
        .map(str::to_string)
        .collect()
    }

    /// Reads one file's content from a commit's tree.
    pub fn file_content_at(&self, commit: &Sha, path: &str) -> String {
        git_stdout(&self.work, &["show", &format!("{commit}:{path}")])
    }
}

fn git(workdir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .current_dir(workdir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn git_stdout(workdir: &Path, args: &[&str]) -> String {
    let output = std::process::Command::new("git")
        .current_dir(workdir)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .args(args)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
