//! Rendering a merge train into an integration-tip commit message.

use crate::types::MergeTrain;

use super::{STATE_BLOCK_BEGIN, STATE_BLOCK_END};

/// Formats the commit message stamped onto the integration tip.
///
/// The message is a human-readable header followed by the machine-readable
/// state block:
///
/// ```text
/// branch-bot: merge train for issue #456 (2 members)
///
/// - feature1
/// - feature2
///
/// <!-- branch-bot-state:begin -->
/// {"project_id":123,"issue_iid":456,...}
/// <!-- branch-bot-state:end -->
/// ```
///
/// Member order in the payload is the merge order.
pub fn format_tip_message(train: &MergeTrain) -> String {
    let payload = serde_json::to_string(train)
        .expect("a merge train always serializes: no non-string keys, no non-finite numbers");

    let mut message = format!(
        "branch-bot: merge train for issue {} ({} {})\n",
        train.issue_iid,
        train.members.len(),
        if train.members.len() == 1 {
            "member"
        } else {
            "members"
        },
    );

    if !train.members.is_empty() {
        message.push('\n');
        for member in &train.members {
            message.push_str(&format!("- {}\n", member.branch));
        }
    }

    message.push('\n');
    message.push_str(STATE_BLOCK_BEGIN);
    message.push('\n');
    message.push_str(&payload);
    message.push('\n');
    message.push_str(STATE_BLOCK_END);
    message.push('\n');

    message
}
