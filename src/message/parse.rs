//! Extracting a merge train from an integration-tip commit message.

use thiserror::Error;

use crate::types::{IssueIid, MergeTrain, ProjectId};

use super::{STATE_BLOCK_BEGIN, STATE_BLOCK_END};

/// Errors that can occur when decoding a tip message.
///
/// Callers loading operator state treat every variant as "no state present":
/// a branch whose tip does not carry a matching state block is never
/// overwritten without explicit operator intent.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The message does not contain a balanced state-block marker pair.
    #[error("state block markers not found in tip message")]
    MarkerNotFound,

    /// The payload between the markers is not a valid train document.
    #[error("invalid state block payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    /// The payload decoded but a member carries an empty branch name.
    #[error("state block payload contains an empty member branch name")]
    EmptyMemberBranch,

    /// The payload decoded, but identifies a different train.
    #[error(
        "state block identifies train ({found_project}, {found_issue}, {found_branch}), \
         expected ({project}, {issue}, {branch})"
    )]
    TupleMismatch {
        project: ProjectId,
        issue: IssueIid,
        branch: String,
        found_project: ProjectId,
        found_issue: IssueIid,
        found_branch: String,
    },
}

/// Parses a tip commit message and returns the embedded train, verifying that
/// it identifies the expected `(project, issue, branch)` tuple.
///
/// Unknown fields in the payload are tolerated; the state block format is a
/// compatibility surface.
pub fn parse_tip_message(
    message: &str,
    project_id: ProjectId,
    issue_iid: IssueIid,
    branch_name: &str,
) -> Result<MergeTrain, ParseError> {
    let payload = extract_payload(message)?;
    let train: MergeTrain = serde_json::from_str(payload)?;

    if train.members.iter().any(|m| m.branch.is_empty()) {
        return Err(ParseError::EmptyMemberBranch);
    }

    if train.project_id != project_id
        || train.issue_iid != issue_iid
        || train.branch_name != branch_name
    {
        return Err(ParseError::TupleMismatch {
            project: project_id,
            issue: issue_iid,
            branch: branch_name.to_string(),
            found_project: train.project_id,
            found_issue: train.issue_iid,
            found_branch: train.branch_name,
        });
    }

    Ok(train)
}

/// Extracts the payload between the first balanced marker pair.
fn extract_payload(message: &str) -> Result<&str, ParseError> {
    let begin = message
        .find(STATE_BLOCK_BEGIN)
        .ok_or(ParseError::MarkerNotFound)?;
    let payload_start = begin + STATE_BLOCK_BEGIN.len();

    let end = message[payload_start..]
        .find(STATE_BLOCK_END)
        .ok_or(ParseError::MarkerNotFound)?;

    Ok(message[payload_start..payload_start + end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::format::format_tip_message;
    use crate::types::{MergeTrainItem, Sha};

    fn sample_train() -> MergeTrain {
        MergeTrain {
            project_id: ProjectId(123),
            issue_iid: IssueIid(456),
            branch_name: "bb-branches/456".to_string(),
            members: vec![
                MergeTrainItem {
                    branch: "feature1".to_string(),
                    tip: Sha::parse("a".repeat(40)).unwrap(),
                    merged_commit: Sha::parse("b".repeat(40)).unwrap(),
                },
                MergeTrainItem {
                    branch: "feature2".to_string(),
                    tip: Sha::parse("c".repeat(40)).unwrap(),
                    merged_commit: Sha::parse("d".repeat(40)).unwrap(),
                },
            ],
        }
    }

    fn parse_expected(message: &str) -> Result<MergeTrain, ParseError> {
        parse_tip_message(message, ProjectId(123), IssueIid(456), "bb-branches/456")
    }

    #[test]
    fn roundtrip_preserves_train() {
        let train = sample_train();
        let message = format_tip_message(&train);
        let parsed = parse_expected(&message).unwrap();

        assert_eq!(parsed, train);
    }

    #[test]
    fn roundtrip_preserves_member_order() {
        let train = sample_train();
        let parsed = parse_expected(&format_tip_message(&train)).unwrap();

        let branches: Vec<_> = parsed.members.iter().map(|m| m.branch.as_str()).collect();
        assert_eq!(branches, vec!["feature1", "feature2"]);
    }

    #[test]
    fn missing_markers_is_marker_not_found() {
        let result = parse_expected("Merge branch 'feature1' into main");
        assert!(matches!(result, Err(ParseError::MarkerNotFound)));
    }

    #[test]
    fn unterminated_block_is_marker_not_found() {
        let message = format!("header\n\n{}\n{{}}", STATE_BLOCK_BEGIN);
        let result = parse_expected(&message);
        assert!(matches!(result, Err(ParseError::MarkerNotFound)));
    }

    #[test]
    fn malformed_payload_is_invalid() {
        let message = format!(
            "header\n\n{}\nnot json at all\n{}\n",
            STATE_BLOCK_BEGIN, STATE_BLOCK_END
        );
        let result = parse_expected(&message);
        assert!(matches!(result, Err(ParseError::InvalidPayload(_))));
    }

    #[test]
    fn mismatched_tuple_is_rejected() {
        let message = format_tip_message(&sample_train());
        let result = parse_tip_message(&message, ProjectId(999), IssueIid(456), "bb-branches/456");
        assert!(matches!(result, Err(ParseError::TupleMismatch { .. })));

        let result = parse_tip_message(&message, ProjectId(123), IssueIid(456), "other-branch");
        assert!(matches!(result, Err(ParseError::TupleMismatch { .. })));
    }

    #[test]
    fn empty_member_branch_is_rejected() {
        let payload = format!(
            r#"{{"project_id":123,"issue_iid":456,"branch_name":"bb-branches/456",
                "members":[{{"branch":"","tip":"{}","merged_commit":"{}"}}]}}"#,
            "a".repeat(40),
            "b".repeat(40)
        );
        let message = format!("header\n\n{STATE_BLOCK_BEGIN}\n{payload}\n{STATE_BLOCK_END}\n");
        let result = parse_expected(&message);
        assert!(matches!(result, Err(ParseError::EmptyMemberBranch)));
    }

    #[test]
    fn unknown_payload_fields_are_tolerated() {
        let message = format!(
            "header\n\n{}\n{}\n{}\n",
            STATE_BLOCK_BEGIN,
            r#"{"project_id":123,"issue_iid":456,"branch_name":"bb-branches/456",
                "members":[],"future_field":{"nested":true}}"#,
            STATE_BLOCK_END
        );
        let parsed = parse_expected(&message).unwrap();
        assert!(parsed.members.is_empty());
    }

    #[test]
    fn first_balanced_pair_wins() {
        let first = sample_train();
        let mut second = sample_train();
        second.members.clear();

        let message = format!(
            "{}{}",
            format_tip_message(&first),
            format_tip_message(&second)
        );
        let parsed = parse_expected(&message).unwrap();
        assert_eq!(parsed.members.len(), 2);
    }
}
