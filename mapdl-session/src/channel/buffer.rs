//! Output buffer with escape stripping and incremental line assembly.
//!
//! The engine's output arrives in arbitrary chunks. The buffer keeps the whole
//! text of the current command, hands back each line as soon as its terminator
//! arrives, and exposes the unterminated tail separately so that prompts
//! written without a newline can still be recognised.

use memchr::memchr_iter;
use vte::{Parser, Perform};

/// Accumulated output of the command currently in flight.
///
/// Reset (not appended) at the start of every command.
pub struct OutputBuffer {
    /// Cleaned output text since the last reset.
    text: String,

    /// Offset of the first byte of the line not yet terminated.
    line_start: usize,

    /// Escape sequence parser; state persists across chunks.
    parser: Parser,
}

/// Collects printable text and line controls, dropping escape sequences.
struct Stripper<'a> {
    out: &'a mut String,
}

impl Perform for Stripper<'_> {
    fn print(&mut self, c: char) {
        self.out.push(c);
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte as char);
        }
    }
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self {
            text: String::with_capacity(4096),
            line_start: 0,
            parser: Parser::new(),
        }
    }

    /// Extend the buffer with raw bytes and return the lines they completed.
    ///
    /// Returned lines have their `\n` and any trailing `\r` removed.
    pub fn extend(&mut self, data: &[u8]) -> Vec<String> {
        let before = self.text.len();
        self.parser.advance(&mut Stripper { out: &mut self.text }, data);

        let mut lines = Vec::new();
        for pos in memchr_iter(b'\n', &self.text.as_bytes()[before..]) {
            let end = before + pos;
            let line = self.text[self.line_start..end].trim_end_matches('\r');
            lines.push(line.to_string());
            self.line_start = end + 1;
        }
        lines
    }

    /// The text after the last line terminator.
    pub fn partial(&self) -> &str {
        self.text[self.line_start..].trim_end_matches('\r')
    }

    /// Mark the unterminated tail as consumed, returning it.
    pub fn take_partial(&mut self) -> String {
        let partial = self.partial().to_string();
        self.line_start = self.text.len();
        partial
    }

    /// Get the buffer contents.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Clear the buffer for the next command.
    pub fn reset(&mut self) {
        self.text.clear();
        self.line_start = 0;
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.text.len())
            .field("line_start", &self.line_start)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extend() {
        let mut buffer = OutputBuffer::new();
        let lines = buffer.extend(b"Hello, world!");
        assert!(lines.is_empty());
        assert_eq!(buffer.as_str(), "Hello, world!");
        assert_eq!(buffer.partial(), "Hello, world!");
    }

    #[test]
    fn test_ansi_stripping() {
        let mut buffer = OutputBuffer::new();
        buffer.extend(b"\x1b[32mGreen text\x1b[0m");
        assert_eq!(buffer.as_str(), "Green text");
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut buffer = OutputBuffer::new();
        assert!(buffer.extend(b" PRE").is_empty());
        let lines = buffer.extend(b"P7:\r\n NODE 1\r\n par");
        assert_eq!(lines, vec![" PREP7:", " NODE 1"]);
        assert_eq!(buffer.partial(), " par");
        assert_eq!(buffer.extend(b"tial\n"), vec![" partial"]);
        assert_eq!(buffer.partial(), "");
    }

    #[test]
    fn test_blank_lines_are_returned() {
        let mut buffer = OutputBuffer::new();
        let lines = buffer.extend(b"a\r\n\r\nb\n");
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[test]
    fn test_take_partial_consumes_tail_only() {
        let mut buffer = OutputBuffer::new();
        buffer.extend(b"line\nask (y/n)?");
        assert_eq!(buffer.take_partial(), "ask (y/n)?");
        assert_eq!(buffer.partial(), "");
        assert_eq!(buffer.as_str(), "line\nask (y/n)?");
    }

    #[test]
    fn test_reset_clears_buffer() {
        let mut buffer = OutputBuffer::new();
        buffer.extend(b"test data\nmore");
        buffer.reset();
        assert_eq!(buffer.as_str(), "");
        assert_eq!(buffer.partial(), "");
        assert_eq!(buffer.extend(b"x\n"), vec!["x"]);
    }
}
