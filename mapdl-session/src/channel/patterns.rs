//! Pattern matching utilities for prompt and diagnostic detection.

use std::fmt;

use regex::Regex;

/// Trait for prompt matching - regex by default, extensible for custom parsers.
pub trait PromptMatcher: Send + Sync {
    /// Returns byte offset where match ends, or None if no match.
    fn find_match(&self, text: &str) -> Option<usize>;

    /// Check if the text matches the pattern.
    fn is_match(&self, text: &str) -> bool {
        self.find_match(text).is_some()
    }
}

/// Regex-based prompt matcher (the default implementation).
impl PromptMatcher for Regex {
    fn find_match(&self, text: &str) -> Option<usize> {
        self.find(text).map(|m| m.end())
    }
}

/// Severity of a diagnostic block, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Note => "NOTE",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// What a matched pattern means to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    /// The engine is idle and ready; the command is complete.
    Terminal,
    /// The engine is waiting for an answer the automation cannot give.
    Confirmation,
    /// A diagnostic banner of the given severity.
    Diagnostic(Severity),
}

/// A compiled pattern tagged with its role.
#[derive(Debug, Clone)]
pub struct PromptPattern {
    role: PromptRole,
    pattern: Regex,
}

impl PromptPattern {
    /// Compile a pattern for the given role.
    pub fn new(role: PromptRole, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            role,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn role(&self) -> PromptRole {
        self.role
    }

    /// Get a reference to the underlying regex.
    pub fn regex(&self) -> &Regex {
        &self.pattern
    }
}

impl PromptMatcher for PromptPattern {
    fn find_match(&self, text: &str) -> Option<usize> {
        self.pattern.find_match(text)
    }
}

/// Immutable set of patterns that drive the command/response protocol.
///
/// Terminal and confirmation patterns are tested against single lines of
/// output (and the unterminated tail, for confirmations). Diagnostic patterns
/// are tested against whole blank-line delimited blocks.
#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: Vec<PromptPattern>,
}

impl PatternCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a terminal prompt pattern.
    pub fn with_terminal(self, pattern: &str) -> Result<Self, regex::Error> {
        self.with(PromptRole::Terminal, pattern)
    }

    /// Add a confirmation prompt pattern.
    pub fn with_confirmation(self, pattern: &str) -> Result<Self, regex::Error> {
        self.with(PromptRole::Confirmation, pattern)
    }

    /// Add a diagnostic marker pattern.
    pub fn with_diagnostic(self, severity: Severity, pattern: &str) -> Result<Self, regex::Error> {
        self.with(PromptRole::Diagnostic(severity), pattern)
    }

    fn with(mut self, role: PromptRole, pattern: &str) -> Result<Self, regex::Error> {
        self.patterns.push(PromptPattern::new(role, pattern)?);
        Ok(self)
    }

    /// All patterns with the given role.
    pub fn patterns(&self, role: PromptRole) -> impl Iterator<Item = &PromptPattern> {
        self.patterns.iter().filter(move |p| p.role == role)
    }

    /// Classify a single output line as a terminal or confirmation prompt.
    ///
    /// Confirmation takes precedence over terminal.
    pub fn match_prompt(&self, line: &str) -> Option<PromptRole> {
        if self.is_confirmation(line) {
            Some(PromptRole::Confirmation)
        } else if self.is_terminal(line) {
            Some(PromptRole::Terminal)
        } else {
            None
        }
    }

    pub fn is_terminal(&self, line: &str) -> bool {
        self.patterns(PromptRole::Terminal).any(|p| p.is_match(line))
    }

    pub fn is_confirmation(&self, text: &str) -> bool {
        self.patterns(PromptRole::Confirmation)
            .any(|p| p.is_match(text))
    }

    /// Highest severity marker present in a block of text.
    pub fn severity(&self, block: &str) -> Option<Severity> {
        self.patterns
            .iter()
            .filter_map(|p| match p.role {
                PromptRole::Diagnostic(severity) if p.is_match(block) => Some(severity),
                _ => None,
            })
            .max()
    }
}
