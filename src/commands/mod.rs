//! The chat-style command layer.
//!
//! Issue comments drive the bot: `add <branch>` and `remove <branch>`. This
//! module parses those commands and executes them against an operator loaded
//! from the registry, reporting the outcome back through the injected
//! [`ForgeHelper`]. The forge client itself (API transport, authentication,
//! webhook plumbing) lives outside the core; only its contract is defined
//! here.

pub mod parser;
pub mod types;

use thiserror::Error;

use crate::operator::{OperatorError, OperatorRegistry};
use crate::types::{GitRef, IssueIid, ProjectId};
use crate::view::ViewHelper;

pub use parser::parse_command;
pub use types::Command;

/// The issue comment a command arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentEvent {
    pub project: ProjectId,
    pub issue: IssueIid,
}

/// Error from a forge-side helper call.
#[derive(Debug, Error)]
#[error("forge request failed: {0}")]
pub struct ForgeError(pub String);

/// Forge-side collaborators the command layer depends on.
///
/// Implementations own the API client; the core never talks to the forge
/// directly.
pub trait ForgeHelper {
    /// Resolve a branch name against the forge-side repository.
    fn rev_parse_remote(&self, project: ProjectId, branch: &str) -> Result<GitRef, ForgeError>;

    /// Post a markdown reply under the comment that triggered the command.
    fn reply(&self, event: &CommentEvent, markdown: &str) -> Result<(), ForgeError>;

    /// Award a reaction emoji on the triggering comment.
    fn award_emoji(&self, event: &CommentEvent, name: &str) -> Result<(), ForgeError>;
}

/// The integration branch maintained for an issue.
pub fn integration_branch_name(issue: IssueIid) -> String {
    format!("bb-branches/{}", issue.0)
}

/// Executes a parsed command end to end: resolve the branch on the forge,
/// load the issue's operator, apply the mutation with a push, then reflect
/// the outcome (reaction emoji + synced member view) back into the issue.
///
/// Forge-side reporting failures are logged but never fail the command; the
/// mutation outcome is what counts.
pub fn process_command(
    registry: &OperatorRegistry,
    forge: &dyn ForgeHelper,
    view: &dyn ViewHelper,
    event: &CommentEvent,
    command: &Command,
) {
    tracing::info!(
        project = %event.project,
        issue = %event.issue,
        command = %command,
        "processing command"
    );

    let resolved = match forge.rev_parse_remote(event.project, command.branch()) {
        Ok(resolved) => resolved,
        Err(err) => {
            tracing::warn!(branch = command.branch(), error = %err, "failed to resolve branch");
            let markdown = format!("branch `{}` not found.", command.branch());
            if let Err(err) = forge.reply(event, &markdown) {
                tracing::error!(error = %err, "failed to reply");
            }
            return;
        }
    };

    let operator = match registry.load(
        &integration_branch_name(event.issue),
        event.project,
        event.issue,
    ) {
        Ok(operator) => operator,
        Err(err) => {
            tracing::error!(issue = %event.issue, error = %err, "failed to load merge train");
            if let Err(err) = forge.reply(event, "failed to load the merge train.") {
                tracing::error!(error = %err, "failed to reply");
            }
            return;
        }
    };
    let mut operator = operator.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

    let failure = match command {
        Command::Add { .. } => apply_add(registry, &mut operator, &resolved).err(),
        Command::Remove { .. } => operator.remove_and_push(resolved.name()).err(),
    };

    match &failure {
        None => tracing::info!(command = %command, "command succeeded"),
        Some(err) => tracing::warn!(command = %command, error = %err, "command failed"),
    }

    let emoji = if failure.is_none() { "white_check_mark" } else { "x" };
    if let Err(err) = forge.award_emoji(event, emoji) {
        tracing::error!(error = %err, "failed to award emoji");
    }

    if let Err(err) = operator.sync_view(view, failure.as_ref()) {
        tracing::error!(error = %err, "failed to sync merge train view");
        if let Err(err) = forge.reply(event, "failed to sync the merge train view.") {
            tracing::error!(error = %err, "failed to reply");
        }
    }
}

/// Fetch the branch into the clone, then add it with a push.
///
/// `add` requires the member commit to be locally known; the fetched ref (not
/// the forge-reported one) is what gets added, so the train always records a
/// commit the clone actually has.
fn apply_add(
    registry: &OperatorRegistry,
    operator: &mut crate::operator::MergeTrainOperator,
    resolved: &GitRef,
) -> Result<GitRef, OperatorError> {
    let fetched = {
        let repo = registry.repo();
        let repo = repo.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        repo.fetch_branch(resolved.name())?
    };
    operator.add_and_push(&fetched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::BaseSpec;
    use crate::test_utils::TestRepo;
    use crate::view::{TrainView, ViewError};
    use std::sync::Mutex;

    /// Records forge-side calls and serves branch resolutions from the test
    /// repo's origin.
    struct RecordingForge {
        repo: TestRepo,
        replies: Mutex<Vec<String>>,
        emojis: Mutex<Vec<String>>,
    }

    impl ForgeHelper for RecordingForge {
        fn rev_parse_remote(
            &self,
            _project: ProjectId,
            branch: &str,
        ) -> Result<GitRef, ForgeError> {
            self.repo
                .origin_ref(branch)
                .ok_or_else(|| ForgeError(format!("branch {branch} not found")))
        }

        fn reply(&self, _event: &CommentEvent, markdown: &str) -> Result<(), ForgeError> {
            self.replies.lock().unwrap().push(markdown.to_string());
            Ok(())
        }

        fn award_emoji(&self, _event: &CommentEvent, name: &str) -> Result<(), ForgeError> {
            self.emojis.lock().unwrap().push(name.to_string());
            Ok(())
        }
    }

    struct RecordingView {
        views: Mutex<Vec<TrainView>>,
    }

    impl ViewHelper for RecordingView {
        fn sync(&self, view: &TrainView) -> Result<(), ViewError> {
            self.views.lock().unwrap().push(view.clone());
            Ok(())
        }
    }

    fn setup() -> (RecordingForge, RecordingView, OperatorRegistry) {
        let test_repo = TestRepo::with_origin();
        let base = test_repo.base();
        let registry =
            OperatorRegistry::new(test_repo.repo(), BaseSpec::Pinned(base.commit().clone()));
        let forge = RecordingForge {
            repo: test_repo,
            replies: Mutex::new(Vec::new()),
            emojis: Mutex::new(Vec::new()),
        };
        let view = RecordingView {
            views: Mutex::new(Vec::new()),
        };
        (forge, view, registry)
    }

    const EVENT: CommentEvent = CommentEvent {
        project: ProjectId(123),
        issue: IssueIid(456),
    };

    #[test]
    fn add_command_updates_train_and_awards_check() {
        let (forge, view, registry) = setup();
        let base = forge.repo.base();
        forge.repo.create_branch(&base, "feature1", "file1.txt", "content");
        forge.repo.push("feature1");

        process_command(
            &registry,
            &forge,
            &view,
            &EVENT,
            &Command::Add {
                branch: "feature1".to_string(),
            },
        );

        assert_eq!(*forge.emojis.lock().unwrap(), vec!["white_check_mark"]);

        let views = view.views.lock().unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].rows[0].branch, "feature1");
        assert!(views[0].failure.is_none());

        // The integration branch landed on the remote.
        let repo = forge.repo.repo();
        assert!(repo.remote_ref("bb-branches/456").unwrap().is_some());
    }

    #[test]
    fn unknown_branch_gets_a_reply_and_no_emoji() {
        let (forge, view, registry) = setup();

        process_command(
            &registry,
            &forge,
            &view,
            &EVENT,
            &Command::Add {
                branch: "nope".to_string(),
            },
        );

        let replies = forge.replies.lock().unwrap();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("`nope` not found"));
        assert!(forge.emojis.lock().unwrap().is_empty());
        assert!(view.views.lock().unwrap().is_empty());
    }

    #[test]
    fn remove_of_non_member_awards_x_and_syncs_failure() {
        let (forge, view, registry) = setup();
        let base = forge.repo.base();
        forge.repo.create_branch(&base, "feature1", "file1.txt", "content");
        forge.repo.push("feature1");

        // feature1 exists on the forge but is not in the train.
        process_command(
            &registry,
            &forge,
            &view,
            &EVENT,
            &Command::Remove {
                branch: "feature1".to_string(),
            },
        );

        assert_eq!(*forge.emojis.lock().unwrap(), vec!["x"]);

        let views = view.views.lock().unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].failure.is_some());
    }

    #[test]
    fn conflicting_add_surfaces_report_in_view() {
        let (forge, view, registry) = setup();
        let base = forge.repo.base();
        forge.repo.create_branch(&base, "feature1", "file1.txt", "one");
        forge.repo.push("feature1");
        forge.repo.create_branch(&base, "conflict", "file1.txt", "two");
        forge.repo.push("conflict");

        process_command(
            &registry,
            &forge,
            &view,
            &EVENT,
            &Command::Add {
                branch: "feature1".to_string(),
            },
        );
        process_command(
            &registry,
            &forge,
            &view,
            &EVENT,
            &Command::Add {
                branch: "conflict".to_string(),
            },
        );

        assert_eq!(*forge.emojis.lock().unwrap(), vec!["white_check_mark", "x"]);

        let views = view.views.lock().unwrap();
        let failure = views[1].failure.as_deref().unwrap();
        assert!(failure.contains("file1.txt"));
        assert!(failure.contains("`conflict`"));

        // The failed add did not grow the train.
        assert_eq!(views[1].rows.len(), 1);
    }
}
