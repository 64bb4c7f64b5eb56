//! Channel layer for process I/O and pattern matching.
//!
//! This module owns the engine process, assembles its chunked output into
//! lines (stripping terminal escapes), and holds the pattern catalog used to
//! recognise prompts and diagnostic banners.

mod buffer;
mod patterns;
mod process;

pub use buffer::OutputBuffer;
pub use patterns::{PatternCatalog, PromptMatcher, PromptPattern, PromptRole, Severity};
pub use process::ProcessChannel;
