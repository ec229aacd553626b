//! Issue-body view of a merge train.
//!
//! The core renders the member table and hands it to an injected helper that
//! owns the forge-side update (finding the issue, editing the description or
//! comment). The helper never sees git state, only the rendered view.

use serde::Serialize;
use thiserror::Error;

use crate::types::MergeTrain;

/// Error from the forge-side view helper.
#[derive(Debug, Error)]
#[error("view sync failed: {0}")]
pub struct ViewError(pub String);

/// One row of the rendered member table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainViewRow {
    pub branch: String,
    pub tip: String,
    pub merged_commit: String,
}

/// A rendered snapshot of a train, ready for forge-side display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrainView {
    /// The integration branch the view describes.
    pub branch_name: String,

    /// Member rows in merge order.
    pub rows: Vec<TrainViewRow>,

    /// Markdown describing the last failed operation, if any.
    pub failure: Option<String>,
}

impl TrainView {
    pub fn new(train: &MergeTrain, failure: Option<String>) -> Self {
        TrainView {
            branch_name: train.branch_name.clone(),
            rows: train
                .members
                .iter()
                .map(|m| TrainViewRow {
                    branch: m.branch.clone(),
                    tip: m.tip.short().to_string(),
                    merged_commit: m.merged_commit.short().to_string(),
                })
                .collect(),
            failure,
        }
    }

    /// Renders the view as markdown.
    pub fn as_markdown(&self) -> String {
        let mut out = format!("### Merge train `{}`\n\n", self.branch_name);

        if self.rows.is_empty() {
            out.push_str("_empty_\n");
        } else {
            out.push_str("| # | branch | tip | merged commit |\n");
            out.push_str("|---|--------|-----|---------------|\n");
            for (i, row) in self.rows.iter().enumerate() {
                out.push_str(&format!(
                    "| {} | `{}` | `{}` | `{}` |\n",
                    i + 1,
                    row.branch,
                    row.tip,
                    row.merged_commit
                ));
            }
        }

        if let Some(failure) = &self.failure {
            out.push('\n');
            out.push_str(failure);
        }

        out
    }
}

/// The forge-side renderer injected into
/// [`MergeTrainOperator::sync_view`](crate::operator::MergeTrainOperator::sync_view).
pub trait ViewHelper {
    /// Publish the view wherever the forge shows it (issue body, comment).
    fn sync(&self, view: &TrainView) -> Result<(), ViewError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IssueIid, MergeTrain, MergeTrainItem, ProjectId, Sha};

    fn train_with_member() -> MergeTrain {
        MergeTrain {
            project_id: ProjectId(123),
            issue_iid: IssueIid(456),
            branch_name: "bb-branches/456".to_string(),
            members: vec![MergeTrainItem {
                branch: "feature1".to_string(),
                tip: Sha::parse("a".repeat(40)).unwrap(),
                merged_commit: Sha::parse("b".repeat(40)).unwrap(),
            }],
        }
    }

    #[test]
    fn markdown_lists_members_with_short_shas() {
        let view = TrainView::new(&train_with_member(), None);
        let markdown = view.as_markdown();

        assert!(markdown.contains("### Merge train `bb-branches/456`"));
        assert!(markdown.contains("| 1 | `feature1` | `aaaaaaa` | `bbbbbbb` |"));
    }

    #[test]
    fn empty_train_renders_placeholder() {
        let train = MergeTrain::empty(ProjectId(1), IssueIid(2), "bb-branches/2");
        let view = TrainView::new(&train, None);

        assert!(view.as_markdown().contains("_empty_"));
    }

    #[test]
    fn failure_section_is_appended() {
        let view = TrainView::new(
            &train_with_member(),
            Some("**Merge conflict**".to_string()),
        );

        let markdown = view.as_markdown();
        assert!(markdown.contains("**Merge conflict**"));
        assert!(markdown.find("feature1").unwrap() < markdown.find("conflict").unwrap());
    }
}
