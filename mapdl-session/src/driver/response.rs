//! Response type for command execution results.

use std::time::Duration;

use crate::channel::Severity;

/// A blank-line delimited excerpt of output carrying a diagnostic banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticBlock {
    /// Highest severity marker in the block.
    pub severity: Severity,

    /// The block's lines joined with `\n`.
    pub text: String,
}

impl DiagnosticBlock {
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// How a command reached completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// A terminal prompt was matched.
    Prompt(String),

    /// A confirmation prompt was matched; the engine is waiting for an answer.
    Confirmation(String),
}

impl Completion {
    /// The matched prompt text.
    pub fn text(&self) -> &str {
        match self {
            Completion::Prompt(text) | Completion::Confirmation(text) => text,
        }
    }

    pub fn is_confirmation(&self) -> bool {
        matches!(self, Completion::Confirmation(_))
    }
}

/// Response from a single command line.
#[derive(Debug, Clone)]
pub struct Response {
    /// The command line that was sent.
    pub command: String,

    /// The raw output read while waiting for the prompt, prompt included.
    pub output: String,

    /// The prompt that ended the command.
    pub completion: Completion,

    /// WARNING and NOTE blocks seen in the output.
    pub diagnostics: Vec<DiagnosticBlock>,

    /// Time taken to execute the command.
    pub elapsed: Duration,
}

impl Response {
    /// Get the output lines as an iterator.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.output.lines().map(|line| line.trim_end_matches('\r'))
    }

    /// Check if the output contains a substring.
    pub fn contains(&self, pattern: &str) -> bool {
        self.output.contains(pattern)
    }

    /// Whether the engine is left waiting on a confirmation prompt.
    pub fn awaiting_confirmation(&self) -> bool {
        self.completion.is_confirmation()
    }

    /// Diagnostics of the given severity.
    pub fn diagnostics_of(&self, severity: Severity) -> impl Iterator<Item = &DiagnosticBlock> {
        self.diagnostics
            .iter()
            .filter(move |block| block.severity == severity)
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.output)
    }
}
