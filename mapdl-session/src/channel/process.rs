//! Byte channel to the engine process.
//!
//! A channel owns the spawned engine (a local child on a pseudo-terminal or a
//! remote SSH exec) and exposes two primitives: write a line, read the next
//! chunk. Output is pumped by a background reader into a bounded queue. Reads
//! have no timeout; an engine command may legitimately run for hours.
//!
//! Both backends give the engine a terminal, so it line-buffers its console
//! output and stdout and stderr arrive as one ordered stream.

use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{ChannelError, Result, TransportError};
use crate::transport::{RemoteHost, SshTransport};

/// Read size of the output pumps.
const READ_CHUNK: usize = 16 * 1024;

/// Chunks buffered between the pumps and the dispatcher.
const CHUNK_BACKLOG: usize = 64;

/// How long teardown waits for the engine to exit before killing it.
const EXIT_GRACE: Duration = Duration::from_secs(30);

/// Interval between exit checks of a local engine.
const EXIT_POLL: Duration = Duration::from_millis(50);

/// Size of the local engine's terminal.
const TERMINAL_SIZE: PtySize = PtySize {
    rows: 24,
    cols: 256,
    pixel_width: 0,
    pixel_height: 0,
};

/// A local engine running on its own pseudo-terminal.
struct LocalEngine {
    child: Box<dyn Child + Send + Sync>,
    /// Held so the terminal stays open for the engine's lifetime.
    _master: Box<dyn MasterPty + Send>,
}

impl LocalEngine {
    /// Poll until the engine has exited.
    async fn wait(&mut self) -> std::io::Result<portable_pty::ExitStatus> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            debug!("killing engine pid {:?}", self.child.process_id());
            if let Err(e) = self.child.kill() {
                warn!("failed to kill engine: {}", e);
            }
        }
    }
}

/// The process behind a channel.
enum Process {
    Local(LocalEngine),
    Remote(SshTransport),
    /// A bare stream with no process to reap.
    Detached,
}

/// Where written lines go.
enum Input {
    Stream(Box<dyn AsyncWrite + Send + Unpin>),
    /// Blocking terminal writer; `None` once closed.
    Terminal(Option<Box<dyn Write + Send>>),
}

/// Line-oriented write / chunked read access to one engine process.
pub struct ProcessChannel {
    input: Input,
    chunks: mpsc::Receiver<Bytes>,
    process: Process,
    eof: bool,
}

impl ProcessChannel {
    /// Spawn `command` in `working_dir`, locally or on `remote`.
    pub async fn spawn(
        command: &str,
        working_dir: &Path,
        remote: Option<&RemoteHost>,
    ) -> Result<Self> {
        match remote {
            None => Self::spawn_local(command, working_dir),
            Some(remote) => Self::spawn_remote(command, working_dir, remote.clone()).await,
        }
    }

    /// Spawn `command` as a child of this process, on a new pseudo-terminal.
    ///
    /// The command string is split into program and arguments with POSIX
    /// shell quoting rules, so quoted paths may contain spaces.
    pub fn spawn_local(command: &str, working_dir: &Path) -> Result<Self> {
        let start_failure = |reason: &str| TransportError::ProcessStartFailure {
            command: command.to_string(),
            reason: reason.to_string(),
        };

        let argv = shell_words::split(command).map_err(|e| start_failure(&e.to_string()))?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| start_failure("empty start command"))?;

        let mut builder = CommandBuilder::new(program);
        builder.args(args);
        builder.cwd(working_dir);

        let pair = native_pty_system()
            .openpty(TERMINAL_SIZE)
            .map_err(|e| start_failure(&format!("failed to open a terminal: {e}")))?;
        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| start_failure(&e.to_string()))?;
        // Only the engine may hold the terminal, or the reader never sees end of stream.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| start_failure(&format!("failed to read the terminal: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| start_failure(&format!("failed to write the terminal: {e}")))?;

        let (tx, rx) = mpsc::channel(CHUNK_BACKLOG);
        pump_blocking(reader, tx, "terminal");

        debug!(
            "spawned '{}' (pid {:?}) in {}",
            command,
            child.process_id(),
            working_dir.display()
        );

        Ok(Self {
            input: Input::Terminal(Some(writer)),
            chunks: rx,
            process: Process::Local(LocalEngine {
                child,
                _master: pair.master,
            }),
            eof: false,
        })
    }

    /// Run `command` on a remote host inside `working_dir`, over an SSH PTY.
    pub async fn spawn_remote(
        command: &str,
        working_dir: &Path,
        remote: RemoteHost,
    ) -> Result<Self> {
        let exec = format!(
            "cd {} && {}",
            shell_quote(&working_dir.to_string_lossy()),
            command
        );

        let transport = SshTransport::connect(remote).await?;
        let channel = transport.exec(&exec).await?;
        let (reader, writer) = tokio::io::split(channel.into_stream());

        let (tx, rx) = mpsc::channel(CHUNK_BACKLOG);
        pump(reader, tx, "ssh");

        Ok(Self {
            input: Input::Stream(Box::new(writer)),
            chunks: rx,
            process: Process::Remote(transport),
            eof: false,
        })
    }

    /// Wrap an already connected duplex stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let (tx, rx) = mpsc::channel(CHUNK_BACKLOG);
        pump(reader, tx, "stream");

        Self {
            input: Input::Stream(Box::new(writer)),
            chunks: rx,
            process: Process::Detached,
            eof: false,
        }
    }

    /// Write `text` followed by a line terminator and flush.
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        if self.eof {
            return Err(ChannelError::Closed.into());
        }

        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');

        match &mut self.input {
            Input::Stream(writer) => {
                writer
                    .write_all(line.as_bytes())
                    .await
                    .map_err(ChannelError::Io)?;
                writer.flush().await.map_err(ChannelError::Io)?;
            }
            Input::Terminal(slot) => {
                let mut writer = slot.take().ok_or(ChannelError::Closed)?;
                let (writer, written) = tokio::task::spawn_blocking(move || {
                    let written = writer
                        .write_all(line.as_bytes())
                        .and_then(|()| writer.flush());
                    (writer, written)
                })
                .await
                .map_err(|e| ChannelError::Io(std::io::Error::other(e)))?;
                *slot = Some(writer);
                written.map_err(ChannelError::Io)?;
            }
        }
        Ok(())
    }

    /// Wait for the next chunk of output, or `None` once the process has
    /// closed all of its output streams.
    pub async fn read_chunk(&mut self) -> Option<Bytes> {
        if self.eof {
            return None;
        }

        match self.chunks.recv().await {
            Some(chunk) => {
                trace!("chunk: {} bytes", chunk.len());
                Some(chunk)
            }
            None => {
                debug!("engine output reached end of stream");
                self.eof = true;
                None
            }
        }
    }

    /// Whether end of stream has been observed.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Close the engine's input and wait for the process to exit.
    ///
    /// A local engine that has not exited after a grace period is killed.
    pub async fn shutdown(mut self) -> Result<()> {
        match &mut self.input {
            Input::Stream(writer) => {
                if let Err(e) = writer.shutdown().await {
                    trace!("closing engine input: {}", e);
                }
            }
            // Dropping the terminal writer sends end-of-file.
            Input::Terminal(slot) => drop(slot.take()),
        }

        // Keep reading so the engine never blocks on a full pipe while exiting.
        let drain = async { while self.chunks.recv().await.is_some() {} };
        let drained = tokio::time::timeout(EXIT_GRACE, drain).await.is_ok();

        match self.process {
            Process::Local(mut engine) => {
                let exited = if drained {
                    tokio::time::timeout(EXIT_GRACE, engine.wait()).await.ok()
                } else {
                    None
                };
                match exited {
                    Some(status) => {
                        let status = status.map_err(TransportError::Io)?;
                        debug!("engine exited with {:?}", status);
                    }
                    None => {
                        warn!("engine did not exit within {:?}, killing it", EXIT_GRACE);
                        engine.child.kill().map_err(TransportError::Io)?;
                    }
                }
            }
            Process::Remote(transport) => {
                if !drained {
                    warn!("remote engine still writing after {:?}", EXIT_GRACE);
                }
                transport.close().await?;
            }
            Process::Detached => {}
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProcessChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let process = match &self.process {
            Process::Local(engine) => format!("local pid {:?}", engine.child.process_id()),
            Process::Remote(transport) => format!("remote {}", transport.remote()),
            Process::Detached => "detached".to_string(),
        };
        f.debug_struct("ProcessChannel")
            .field("process", &process)
            .field("eof", &self.eof)
            .finish()
    }
}

/// Forward everything read from `reader` into `tx` until EOF or error.
fn pump<R>(mut reader: R, tx: mpsc::Sender<Bytes>, source: &'static str)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            buf.reserve(READ_CHUNK);
            match reader.read_buf(&mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(buf.split().freeze()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("reading engine {} failed: {}", source, e);
                    break;
                }
            }
        }
        trace!("engine {} closed", source);
    });
}

/// Forward everything read from a blocking `reader` into `tx`, on a thread of its own.
fn pump_blocking(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Bytes>, source: &'static str) {
    std::thread::spawn(move || {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                // A terminal reports EIO once the engine has exited.
                Err(e) => {
                    trace!("engine {} read ended: {}", source, e);
                    break;
                }
            }
        }
        trace!("engine {} closed", source);
    });
}

/// Quote `value` for a POSIX shell.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
