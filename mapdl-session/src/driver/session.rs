//! A live engine session.

use std::path::Path;

use log::{debug, info, warn};

use super::builder::SessionBuilder;
use super::dispatcher::{DispatchState, Dispatcher, SendOptions};
use super::queue::CommandQueue;
use super::response::Response;
use super::workspace::Workspace;
use crate::error::{DriverError, Result};
use crate::platform::EngineProfile;
use crate::transport::RemoteHost;

/// One engine process and the working directory it runs in.
///
/// Commands are strictly alternated with their output, which `&mut self`
/// enforces. Call [`close`](Self::close) to end the engine gracefully; a
/// session that is merely dropped has its process killed.
#[derive(Debug)]
pub struct Session {
    /// `None` once the session has been closed.
    dispatcher: Option<Dispatcher>,
    queue: CommandQueue,
    workspace: Workspace,
    start_command: String,
    remote: Option<RemoteHost>,
    profile: EngineProfile,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub(crate) fn new(
        dispatcher: Dispatcher,
        queue: CommandQueue,
        workspace: Workspace,
        start_command: String,
        remote: Option<RemoteHost>,
        profile: EngineProfile,
    ) -> Self {
        Self {
            dispatcher: Some(dispatcher),
            queue,
            workspace,
            start_command,
            remote,
            profile,
        }
    }

    /// Send command text and wait for the engine to finish with it.
    ///
    /// Multi-line text is sent line by line; see [`Dispatcher::send`].
    pub async fn send(&mut self, text: &str) -> Result<Response> {
        self.send_with(text, &mut SendOptions::new()).await
    }

    /// Like [`send`](Self::send), with explicit output forwarding options.
    pub async fn send_with(&mut self, text: &str, options: &mut SendOptions) -> Result<Response> {
        self.dispatcher()?.send(text, options).await
    }

    /// Output of the last line sent.
    pub fn output(&self) -> &str {
        self.dispatcher.as_ref().map_or("", Dispatcher::output)
    }

    pub fn state(&self) -> DispatchState {
        self.dispatcher
            .as_ref()
            .map_or(DispatchState::Faulted, Dispatcher::state)
    }

    /// Whether the engine process is still producing output.
    pub fn is_alive(&self) -> bool {
        self.dispatcher.as_ref().is_some_and(Dispatcher::is_alive)
    }

    /// Directory the engine runs in.
    pub fn working_dir(&self) -> &Path {
        self.workspace.path()
    }

    pub fn start_command(&self) -> &str {
        &self.start_command
    }

    pub fn remote(&self) -> Option<&RemoteHost> {
        self.remote.as_ref()
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    /// Add command text to the deferred queue.
    pub async fn queue(&mut self, text: &str) -> Result<()> {
        self.queue.enqueue(text).await
    }

    /// Run everything queued as one engine command.
    pub async fn run_queue(&mut self) -> Result<Option<Response>> {
        self.run_queue_with(&mut SendOptions::new()).await
    }

    pub async fn run_queue_with(&mut self, options: &mut SendOptions) -> Result<Option<Response>> {
        let dispatcher = self
            .dispatcher
            .as_mut()
            .ok_or(DriverError::SessionClosed)?;
        self.queue.flush(dispatcher, options).await
    }

    /// The queued lines, without running or discarding them.
    pub async fn queued(&mut self) -> Result<Vec<String>> {
        self.queue.peek().await
    }

    /// End the engine and release the working directory.
    ///
    /// The profile's closing commands are written without waiting for a
    /// prompt, since the last of them ends the process. Directory removal
    /// failures are logged and never returned.
    pub async fn close(mut self) -> Result<()> {
        let Some(mut dispatcher) = self.dispatcher.take() else {
            return Ok(());
        };
        info!(
            "closing {} in {}",
            self.start_command,
            self.workspace.path().display()
        );

        if dispatcher.is_alive() {
            for command in &self.profile.on_close_commands {
                if let Err(e) = dispatcher.write_raw(command).await {
                    debug!("engine stopped reading before '{}': {}", command, e);
                    break;
                }
            }
        }

        let result = dispatcher.into_channel().shutdown().await;
        self.workspace.release();
        result
    }

    fn dispatcher(&mut self) -> Result<&mut Dispatcher> {
        self.dispatcher
            .as_mut()
            .ok_or_else(|| DriverError::SessionClosed.into())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.dispatcher.take().is_some() {
            warn!(
                "session in {} dropped without close(); killing the engine",
                self.workspace.path().display()
            );
            self.workspace.release();
        }
    }
}
