//! Operator commands typed on the server's stdin.
//!
//! The server understands exactly one command, `/quit`.  Everything else is
//! reported back to the operator and otherwise ignored.

/// A parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Shut the server down.
    Quit,
    /// Any other non-blank line.
    Unknown(String),
}

impl ConsoleCommand {
    /// Parses one line.  Surrounding whitespace is ignored; the match is exact
    /// and case-sensitive.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "/quit" => ConsoleCommand::Quit,
            other => ConsoleCommand::Unknown(other.to_string()),
        }
    }
}
