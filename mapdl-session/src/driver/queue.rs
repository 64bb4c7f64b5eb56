//! Deferred command queue.
//!
//! Every command sent through the dispatcher costs a full prompt round trip.
//! When thousands of small commands are generated (mesh entities, loads) the
//! queue writes them to a scratch input file instead and runs the file as a
//! single engine command.

use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};

use super::dispatcher::{Dispatcher, SendOptions};
use super::response::Response;
use crate::error::{DriverError, Result};

/// Scratch file name, relative to the working directory.
pub const QUEUE_FILE: &str = "input.inp";

/// Engine command that reads and runs [`QUEUE_FILE`].
const RUN_QUEUE_FILE: &str = "/input,input,inp";

/// State of the backing file.
#[derive(Debug)]
enum Backing {
    /// Open for writing; queued text may still sit in the write buffer.
    Open(BufWriter<File>),
    /// Closed after a flush, or after a failed reopen.
    Closed,
}

/// Ordered, append-only batch of command lines backed by a scratch file.
#[derive(Debug)]
pub struct CommandQueue {
    path: PathBuf,
    backing: Backing,
    lines: usize,
}

impl CommandQueue {
    /// Create (or truncate) the queue file inside `dir`.
    pub async fn create(dir: &Path) -> Result<Self> {
        let path = dir.join(QUEUE_FILE);
        let file = open(&path, true).await?;
        Ok(Self {
            path,
            backing: Backing::Open(BufWriter::new(file)),
            lines: 0,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of lines queued since the last flush.
    pub fn len(&self) -> usize {
        self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Append `text` and a line terminator to the batch.
    pub async fn enqueue(&mut self, text: &str) -> Result<()> {
        if matches!(self.backing, Backing::Closed) {
            let file = open(&self.path, false).await?;
            self.backing = Backing::Open(BufWriter::new(file));
        }
        let Backing::Open(writer) = &mut self.backing else {
            return Err(DriverError::InvalidConfig {
                message: "queue file is not open".to_string(),
            }
            .into());
        };

        writer
            .write_all(text.as_bytes())
            .await
            .map_err(|e| DriverError::filesystem(&self.path, e))?;
        writer
            .write_all(b"\n")
            .await
            .map_err(|e| DriverError::filesystem(&self.path, e))?;

        self.lines += text.split('\n').count();
        Ok(())
    }

    /// Run the whole batch as one engine command and start a new batch.
    ///
    /// Returns `None` without contacting the engine when nothing is queued.
    /// The batch is discarded whether or not the engine ran it cleanly.
    pub async fn flush(
        &mut self,
        dispatcher: &mut Dispatcher,
        options: &mut SendOptions,
    ) -> Result<Option<Response>> {
        self.close().await?;

        if self.lines == 0 {
            self.reopen_truncated().await?;
            return Ok(None);
        }

        debug!("running {} queued lines from {}", self.lines, self.path.display());
        let result = dispatcher.send(RUN_QUEUE_FILE, options).await;

        self.reopen_truncated().await?;
        result.map(Some)
    }

    /// The queued lines, read back without closing or truncating the file.
    pub async fn peek(&mut self) -> Result<Vec<String>> {
        if let Backing::Open(writer) = &mut self.backing {
            writer
                .flush()
                .await
                .map_err(|e| DriverError::filesystem(&self.path, e))?;
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DriverError::filesystem(&self.path, e))?;
        Ok(contents.lines().map(str::to_string).collect())
    }

    /// Flush buffered text and sync the file to disk.
    async fn close(&mut self) -> Result<()> {
        if let Backing::Open(mut writer) = std::mem::replace(&mut self.backing, Backing::Closed) {
            writer
                .flush()
                .await
                .map_err(|e| DriverError::filesystem(&self.path, e))?;
            writer
                .into_inner()
                .sync_all()
                .await
                .map_err(|e| DriverError::filesystem(&self.path, e))?;
        }
        Ok(())
    }

    async fn reopen_truncated(&mut self) -> Result<()> {
        let file = open(&self.path, true).await?;
        self.backing = Backing::Open(BufWriter::new(file));
        self.lines = 0;
        Ok(())
    }
}

async fn open(path: &Path, truncate: bool) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true);
    if truncate {
        options.write(true).truncate(true);
    } else {
        options.append(true);
    }
    let file = options
        .open(path)
        .await
        .map_err(|e| DriverError::filesystem(path, e))?;
    Ok(file)
}
