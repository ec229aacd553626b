//! Parser for bot commands in comment text.
//!
//! A pure parser that extracts structured commands from unstructured issue
//! comment text.

use super::types::Command;

/// Parses the first bot command found in comment text.
///
/// # Parsing Rules
///
/// - Commands occupy a whole line: `add <branch>` or `remove <branch>`
/// - Command names are case-insensitive; branch names are not
/// - Leading/trailing whitespace on the line is ignored
/// - The branch name is a single whitespace-free token; trailing tokens
///   disqualify the line (it is prose, not a command)
/// - The first valid command line wins
///
/// # Examples
///
/// ```
/// use branch_bot::commands::{Command, parse_command};
///
/// assert_eq!(
///     parse_command("add feature-1"),
///     Some(Command::Add { branch: "feature-1".to_string() })
/// );
/// assert_eq!(
///     parse_command("please\nREMOVE feature-1\nthanks"),
///     Some(Command::Remove { branch: "feature-1".to_string() })
/// );
/// assert_eq!(parse_command("add more tests please"), None);
/// ```
pub fn parse_command(text: &str) -> Option<Command> {
    text.lines().find_map(parse_line)
}

fn parse_line(line: &str) -> Option<Command> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next()?;
    let branch = tokens.next()?;

    // A third token means the line is prose, not a command.
    if tokens.next().is_some() {
        return None;
    }

    match keyword.to_ascii_lowercase().as_str() {
        "add" => Some(Command::Add {
            branch: branch.to_string(),
        }),
        "remove" => Some(Command::Remove {
            branch: branch.to_string(),
        }),
        _ => None,
    }
}
