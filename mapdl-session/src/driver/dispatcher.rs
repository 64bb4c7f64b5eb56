//! Command dispatcher: the command/response state machine.
//!
//! A command is written one line at a time. After each line the dispatcher
//! reads output until a terminal or confirmation prompt appears, sorting the
//! lines in between into blank-line delimited blocks. The terminal's echo of
//! the line itself is skipped. Blocks carrying an
//! ERROR banner fail the command; WARNING and NOTE blocks are logged and
//! collected.

use std::fmt;
use std::time::Instant;

use log::{debug, info, warn};

use super::response::{Completion, DiagnosticBlock, Response};
use crate::channel::{OutputBuffer, PatternCatalog, ProcessChannel, PromptRole, Severity};
use crate::error::{ChannelError, DriverError, Result};

/// Callback receiving output lines while a command runs.
pub type OutputSink = Box<dyn FnMut(&str) + Send>;

/// Where the dispatcher is in the command/response cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No command has been sent yet.
    Idle,
    /// A line is being written to the engine.
    Sending,
    /// Reading output until a prompt matches.
    AwaitingPrompt,
    /// The last line completed at a terminal prompt.
    Done,
    /// The last line completed at a confirmation prompt. The engine is still
    /// waiting for an answer, so the next line sent will be read as that
    /// answer rather than as a new command.
    ConfirmationPending,
    /// The last line failed with an engine error or end of stream.
    Faulted,
}

/// Per-call options for [`Dispatcher::send`].
pub struct SendOptions {
    silent: bool,
    sink: Option<OutputSink>,
}

impl SendOptions {
    /// Silent options: output is only buffered.
    pub fn new() -> Self {
        Self {
            silent: true,
            sink: None,
        }
    }

    /// Forward every output line to stdout as it arrives.
    pub fn verbose() -> Self {
        Self {
            silent: false,
            sink: None,
        }
    }

    /// Set whether output lines are forwarded.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Forward output lines to `sink` instead of stdout. Implies `silent(false)`.
    pub fn with_sink(mut self, sink: impl FnMut(&str) + Send + 'static) -> Self {
        self.silent = false;
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }

    fn emit(&mut self, line: &str) {
        if self.silent {
            return;
        }
        let line = line.trim();
        match self.sink.as_mut() {
            Some(sink) => sink(line),
            None => println!("{line}"),
        }
    }
}

impl Default for SendOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendOptions")
            .field("silent", &self.silent)
            .field("sink", &self.sink.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

/// Drives one engine process through strict request/response alternation.
#[derive(Debug)]
pub struct Dispatcher {
    channel: ProcessChannel,
    catalog: PatternCatalog,
    buffer: OutputBuffer,
    state: DispatchState,
}

impl Dispatcher {
    pub fn new(channel: ProcessChannel, catalog: PatternCatalog) -> Self {
        Self {
            channel,
            catalog,
            buffer: OutputBuffer::new(),
            state: DispatchState::Idle,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Output of the last line sent, valid until the next send.
    pub fn output(&self) -> &str {
        self.buffer.as_str()
    }

    pub fn catalog(&self) -> &PatternCatalog {
        &self.catalog
    }

    /// Whether the engine's output stream is still open.
    pub fn is_alive(&self) -> bool {
        !self.channel.is_eof()
    }

    /// Send command text, one line at a time.
    ///
    /// Text containing line breaks is a script: every line goes through the
    /// full send/await cycle in order, and the first failing line stops the
    /// script. The returned response, and [`output`](Self::output), belong to
    /// the last line.
    pub async fn send(&mut self, text: &str, options: &mut SendOptions) -> Result<Response> {
        let mut lines = text.split('\n').map(|line| line.trim_end_matches('\r'));
        let first = lines.next().unwrap_or_default();

        let mut response = self.send_line(first, options).await?;
        for line in lines {
            response = self.send_line(line, options).await?;
        }
        Ok(response)
    }

    /// Send a single line and wait for the engine to finish with it.
    pub async fn send_line(&mut self, line: &str, options: &mut SendOptions) -> Result<Response> {
        if self.channel.is_eof() {
            self.state = DispatchState::Faulted;
            return Err(DriverError::SessionClosed.into());
        }
        if self.state == DispatchState::ConfirmationPending {
            warn!(
                "engine is waiting on a confirmation prompt; '{}' will be read as the answer",
                line
            );
        }

        let start = Instant::now();
        self.state = DispatchState::Sending;
        self.buffer.reset();

        debug!("send: {:?}", line);
        if let Err(e) = self.channel.write_line(line).await {
            self.state = DispatchState::Faulted;
            return Err(e);
        }
        self.state = DispatchState::AwaitingPrompt;

        let mut block: Vec<String> = Vec::new();
        let mut diagnostics = Vec::new();
        let mut fault: Option<DiagnosticBlock> = None;
        // A terminal echoes the line back before the engine answers.
        let mut echo_pending = true;

        let completion = loop {
            let Some(chunk) = self.channel.read_chunk().await else {
                self.state = DispatchState::Faulted;
                if !self.buffer.partial().is_empty() {
                    options.emit(self.buffer.partial());
                }
                if let Some(block) = fault {
                    return Err(engine_error(line, block));
                }
                return Err(ChannelError::UnexpectedEof {
                    command: line.to_string(),
                    output: self.buffer.as_str().to_string(),
                }
                .into());
            };

            let mut completion = None;
            for text in self.buffer.extend(&chunk) {
                if std::mem::take(&mut echo_pending) && text.trim() == line.trim() {
                    continue;
                }
                options.emit(&text);
                if completion.is_some() {
                    continue;
                }
                match self.catalog.match_prompt(&text) {
                    Some(PromptRole::Confirmation) => {
                        completion = Some(Completion::Confirmation(text));
                    }
                    Some(PromptRole::Terminal) => completion = Some(Completion::Prompt(text)),
                    _ if text.trim().is_empty() => {
                        self.close_block(&mut block, &mut diagnostics, &mut fault);
                    }
                    _ => block.push(text),
                }
            }

            // Questions are often written without a line terminator.
            if completion.is_none() && self.catalog.is_confirmation(self.buffer.partial()) {
                let partial = self.buffer.take_partial();
                options.emit(&partial);
                completion = Some(Completion::Confirmation(partial));
            }

            if let Some(completion) = completion {
                break completion;
            }
        };

        // A block still open at the prompt is classified like any other.
        self.close_block(&mut block, &mut diagnostics, &mut fault);

        if let Some(block) = fault {
            self.state = DispatchState::Faulted;
            return Err(engine_error(line, block));
        }

        let elapsed = start.elapsed();
        self.state = match &completion {
            Completion::Confirmation(prompt) => {
                warn!(
                    "'{}' stopped at a confirmation prompt the session cannot answer: {}",
                    line,
                    prompt.trim()
                );
                DispatchState::ConfirmationPending
            }
            Completion::Prompt(_) => DispatchState::Done,
        };
        debug!(
            "completed {:?} in {:?} at {:?}",
            line,
            elapsed,
            completion.text().trim()
        );

        Ok(Response {
            command: line.to_string(),
            output: self.buffer.as_str().to_string(),
            completion,
            diagnostics,
            elapsed,
        })
    }

    /// Write a line without waiting for any prompt.
    pub async fn write_raw(&mut self, line: &str) -> Result<()> {
        debug!("send (no wait): {:?}", line);
        self.state = DispatchState::Idle;
        self.buffer.reset();
        self.channel.write_line(line).await
    }

    /// Give up the channel, e.g. to shut the process down.
    pub fn into_channel(self) -> ProcessChannel {
        self.channel
    }

    /// Classify the lines collected since the last blank line and start a new block.
    fn close_block(
        &self,
        block: &mut Vec<String>,
        diagnostics: &mut Vec<DiagnosticBlock>,
        fault: &mut Option<DiagnosticBlock>,
    ) {
        if block.is_empty() {
            return;
        }
        let text = block.join("\n");
        block.clear();

        let Some(severity) = self.catalog.severity(&text) else {
            return;
        };
        let diagnostic = DiagnosticBlock::new(severity, text);
        match severity {
            Severity::Error => {
                debug!("engine error:\n{}", diagnostic.text);
                if fault.is_none() {
                    *fault = Some(diagnostic);
                }
            }
            Severity::Warning => {
                warn!("{}", diagnostic.text);
                diagnostics.push(diagnostic);
            }
            Severity::Note => {
                info!("{}", diagnostic.text);
                diagnostics.push(diagnostic);
            }
        }
    }
}

fn engine_error(command: &str, block: DiagnosticBlock) -> crate::Error {
    DriverError::EngineRuntime {
        command: command.to_string(),
        block: block.text,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::Error;
    use crate::driver::testing::scripted_engine;

    #[tokio::test]
    async fn test_single_line_completes_at_prompt() {
        let mut dispatcher = scripted_engine(vec![(
            "/prep7",
            vec!["\r\n PREPROCESSOR\r\n\r\n PREP7:\r\n"],
        )]);

        let response = assert_ok!(dispatcher.send("/prep7", &mut SendOptions::new()).await);
        assert_eq!(response.completion, Completion::Prompt(" PREP7:".into()));
        assert!(response.contains("PREPROCESSOR"));
        assert_eq!(dispatcher.state(), DispatchState::Done);
        assert_eq!(dispatcher.output(), response.output);
    }

    #[tokio::test]
    async fn test_prompt_split_across_chunks() {
        let mut dispatcher = scripted_engine(vec![(
            "n,,1",
            vec![" NODE      1\r\n\r\n PRE", "P7", ":\r", "\n"],
        )]);

        let response = assert_ok!(dispatcher.send("n,,1", &mut SendOptions::new()).await);
        assert_eq!(response.completion.text(), " PREP7:");
    }

    #[tokio::test]
    async fn test_output_is_reset_between_commands() {
        let mut dispatcher = scripted_engine(vec![
            ("first", vec![" one\r\n BEGIN:\r\n"]),
            ("second", vec![" two\r\n BEGIN:\r\n"]),
        ]);
        let mut options = SendOptions::new();

        dispatcher.send("first", &mut options).await.unwrap();
        assert!(dispatcher.output().contains("one"));
        dispatcher.send("second", &mut options).await.unwrap();
        assert!(dispatcher.output().contains("two"));
        assert!(!dispatcher.output().contains("one"));
        assert_eq!(dispatcher.output().matches("BEGIN:").count(), 1);
    }

    #[tokio::test]
    async fn test_multiline_text_is_sent_line_by_line() {
        let mut dispatcher = scripted_engine(vec![
            ("/prep7", vec![" PREP7:\r\n"]),
            ("et,,188", vec![" ELEMENT TYPE 1 IS BEAM188\r\n PREP7:\r\n"]),
            ("n,,", vec![" NODE 1\r\n PREP7:\r\n"]),
        ]);

        let response = assert_ok!(
            dispatcher
                .send("/prep7\r\net,,188\nn,,", &mut SendOptions::new())
                .await
        );
        assert_eq!(response.command, "n,,");
        assert_eq!(dispatcher.output(), " NODE 1\r\n PREP7:\r\n");
    }

    #[tokio::test]
    async fn test_error_block_is_fatal_and_isolated() {
        let mut dispatcher = scripted_engine(vec![
            (
                "foo",
                vec![
                    " previous block\r\n\r\n *** ERROR ***   CP = 0.1\r\n Unknown command name FOO.\r\n\r\n next block\r\n\r\n",
                    " BEGIN:\r\n",
                ],
            ),
            ("/com,still alive", vec![" still alive\r\n BEGIN:\r\n"]),
        ]);

        let err = assert_err!(dispatcher.send("foo", &mut SendOptions::new()).await);
        match err {
            Error::Driver(DriverError::EngineRuntime { command, block }) => {
                assert_eq!(command, "foo");
                assert_eq!(block, " *** ERROR ***   CP = 0.1\n Unknown command name FOO.");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(dispatcher.state(), DispatchState::Faulted);

        // The prompt that followed the error was consumed, so the session stays in step.
        let response = assert_ok!(
            dispatcher
                .send("/com,still alive", &mut SendOptions::new())
                .await
        );
        assert!(response.contains("still alive"));
        assert_eq!(dispatcher.state(), DispatchState::Done);
    }

    #[tokio::test]
    async fn test_unterminated_error_block_before_prompt() {
        let mut dispatcher = scripted_engine(vec![(
            "bad",
            vec![" *** ERROR ***\r\n bad input\r\n BEGIN:\r\n"],
        )]);

        let err = assert_err!(dispatcher.send("bad", &mut SendOptions::new()).await);
        assert!(err.to_string().contains("bad input"));
    }

    #[tokio::test]
    async fn test_warnings_and_notes_do_not_abort() {
        let mut dispatcher = scripted_engine(vec![(
            "solve",
            vec![
                " *** WARNING ***\r\n Mesh is coarse.\r\n\r\n *** NOTE ***\r\n Data checking completed.\r\n\r\n",
                " SOLU_LS1:\r\n",
            ],
        )]);

        let response = assert_ok!(dispatcher.send("solve", &mut SendOptions::new()).await);
        assert_eq!(response.diagnostics.len(), 2);
        assert_eq!(response.diagnostics[0].severity, Severity::Warning);
        assert_eq!(response.diagnostics[0].text, " *** WARNING ***\n Mesh is coarse.");
        assert_eq!(response.diagnostics[1].severity, Severity::Note);
        assert!(!response.diagnostics[1].is_fatal());
    }

    #[tokio::test]
    async fn test_confirmation_prompt_without_newline() {
        let mut dispatcher = scripted_engine(vec![
            ("/clear", vec![" DO YOU WANT TO CLEAR THE DATABASE (y/n)? "]),
            ("y", vec![" CLEAR DATABASE\r\n BEGIN:\r\n"]),
        ]);

        let response = assert_ok!(dispatcher.send("/clear", &mut SendOptions::new()).await);
        assert!(response.awaiting_confirmation());
        assert_eq!(dispatcher.state(), DispatchState::ConfirmationPending);

        let response = assert_ok!(dispatcher.send("y", &mut SendOptions::new()).await);
        assert!(!response.awaiting_confirmation());
        assert_eq!(dispatcher.state(), DispatchState::Done);
    }

    #[tokio::test]
    async fn test_eof_before_prompt() {
        let mut dispatcher = scripted_engine(vec![("/exit", vec![" EXITING\r\n"])]);

        let err = assert_err!(dispatcher.send("/exit", &mut SendOptions::new()).await);
        match err {
            Error::Channel(ChannelError::UnexpectedEof { command, output }) => {
                assert_eq!(command, "/exit");
                assert_eq!(output, " EXITING\r\n");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dispatcher.is_alive());

        let err = assert_err!(dispatcher.send("/prep7", &mut SendOptions::new()).await);
        assert!(matches!(err, Error::Driver(DriverError::SessionClosed)));
    }

    #[tokio::test]
    async fn test_verbose_sink_receives_lines() {
        let mut dispatcher = scripted_engine(vec![(
            "nlist",
            vec!["  NODE  X\r\n    1  0.0\r\n", "\r\n BEGIN:\r\n"],
        )]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let mut options =
            SendOptions::new().with_sink(move |line| sink_seen.lock().unwrap().push(line.to_string()));

        dispatcher.send("nlist", &mut options).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["NODE  X", "1  0.0", "", "BEGIN:"]
        );
    }

    #[tokio::test]
    async fn test_terminal_echo_is_skipped() {
        let mut dispatcher = scripted_engine(vec![(
            "/com,nlist",
            vec!["/com,nlist\r\n", " /com,nlist\r\n\r\n BEGIN:\r\n"],
        )]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let mut options =
            SendOptions::new().with_sink(move |line| sink_seen.lock().unwrap().push(line.to_string()));

        dispatcher.send("/com,nlist", &mut options).await.unwrap();

        // Only the first matching line is the echo; the engine's own copy is kept.
        assert_eq!(*seen.lock().unwrap(), vec!["/com,nlist", "", "BEGIN:"]);
    }

    #[test]
    fn test_send_options_defaults() {
        assert!(SendOptions::default().is_silent());
        assert!(!SendOptions::verbose().is_silent());
        assert!(!SendOptions::new().with_sink(|_| {}).is_silent());
    }
}
