//! Builder for starting engine sessions.

use std::path::PathBuf;

use log::{debug, info};

use super::dispatcher::{Dispatcher, SendOptions};
use super::queue::CommandQueue;
use super::session::Session;
use super::workspace::Workspace;
use crate::channel::ProcessChannel;
use crate::error::{ChannelError, Result, TransportError};
use crate::platform::{EngineProfile, mapdl};
use crate::transport::RemoteHost;

/// Environment variable consulted when no start command is given.
pub const START_COMMAND_ENV: &str = "MAPDL_START_COMMAND";

/// Builder for constructing engine sessions.
///
/// # Example
///
/// ```rust,no_run
/// use mapdl_session::Session;
///
/// # async fn example() -> Result<(), mapdl_session::Error> {
/// let mut session = Session::builder()
///     .start_command("ansys150 -p aa_r")
///     .cleanup(true)
///     .build()
///     .await?;
///
/// session.send("/prep7").await?;
/// session.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SessionBuilder {
    start_command: Option<String>,
    start_folder: Option<PathBuf>,
    base_dir: Option<PathBuf>,
    cleanup: bool,
    remote: Option<RemoteHost>,
    profile: Option<EngineProfile>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command used to start the engine, split on whitespace.
    ///
    /// Defaults to `$MAPDL_START_COMMAND`, then to the profile's built-in command.
    pub fn start_command(mut self, command: impl Into<String>) -> Self {
        self.start_command = Some(command.into());
        self
    }

    /// Run in an existing directory instead of a generated one.
    ///
    /// The folder must exist and is never removed, whatever [`cleanup`](Self::cleanup) says.
    pub fn start_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.start_folder = Some(folder.into());
        self
    }

    /// Parent of the generated `session_<timestamp>` directory (default: current directory).
    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Remove the generated working directory on teardown (default: false).
    pub fn cleanup(mut self, cleanup: bool) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Start the engine on a remote host over SSH.
    pub fn remote(mut self, remote: RemoteHost) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Use a custom engine profile instead of the MAPDL one.
    pub fn profile(mut self, profile: EngineProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Provision the working directory, start the engine and wait until it is ready.
    pub async fn build(self) -> Result<Session> {
        let profile = match self.profile {
            Some(profile) => profile,
            None => mapdl::profile().map_err(ChannelError::from)?,
        };

        let start_command = resolve_start_command(
            self.start_command,
            std::env::var(START_COMMAND_ENV).ok(),
            &profile.default_start_command,
        );

        let workspace = match self.start_folder {
            Some(folder) => Workspace::existing(folder)?,
            None => {
                let base = match self.base_dir {
                    Some(base) => base,
                    None => std::env::current_dir().map_err(TransportError::Io)?,
                };
                Workspace::create(&base, self.cleanup)?
            }
        };

        let dispatcher =
            match start(&start_command, &workspace, self.remote.as_ref(), &profile).await {
                Ok(dispatcher) => dispatcher,
                Err(e) => {
                    workspace.release();
                    return Err(e);
                }
            };

        let queue = match CommandQueue::create(workspace.path()).await {
            Ok(queue) => queue,
            Err(e) => {
                drop(dispatcher);
                workspace.release();
                return Err(e);
            }
        };

        info!(
            "{} started in directory {}",
            start_command,
            workspace.path().display()
        );

        let on_open = profile.on_open_commands.clone();
        let mut session = Session::new(
            dispatcher,
            queue,
            workspace,
            start_command,
            self.remote,
            profile,
        );
        for command in &on_open {
            session.send(command).await?;
        }
        Ok(session)
    }
}

/// Spawn the engine and complete the startup handshake.
///
/// Any failure up to the first prompt, including the process exiting early,
/// is reported as a start failure.
async fn start(
    command: &str,
    workspace: &Workspace,
    remote: Option<&RemoteHost>,
    profile: &EngineProfile,
) -> Result<Dispatcher> {
    let channel = ProcessChannel::spawn(command, workspace.path(), remote).await?;
    let mut dispatcher = Dispatcher::new(channel, profile.catalog.clone());

    // The engine asks for <CR> before its first prompt.
    debug!("waiting for the first prompt of '{}'", command);
    match dispatcher.send_line("", &mut SendOptions::new()).await {
        Ok(_) => Ok(dispatcher),
        Err(e) => Err(TransportError::ProcessStartFailure {
            command: command.to_string(),
            reason: e.to_string(),
        }
        .into()),
    }
}

/// Explicit command, then the environment, then the built-in default.
fn resolve_start_command(explicit: Option<String>, env: Option<String>, default: &str) -> String {
    explicit
        .or_else(|| env.filter(|value| !value.trim().is_empty()))
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_command_precedence() {
        assert_eq!(
            resolve_start_command(Some("ansys182".into()), Some("ansys170".into()), "ansys150"),
            "ansys182"
        );
        assert_eq!(
            resolve_start_command(None, Some("ansys170 -np 4".into()), "ansys150"),
            "ansys170 -np 4"
        );
        assert_eq!(resolve_start_command(None, None, "ansys150"), "ansys150");
        assert_eq!(resolve_start_command(None, Some("  ".into()), "ansys150"), "ansys150");
    }

    #[tokio::test]
    async fn test_missing_start_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = SessionBuilder::new()
            .start_command("ansys150")
            .start_folder(dir.path().join("missing"))
            .build()
            .await;
        assert!(matches!(
            result,
            Err(crate::Error::Driver(crate::error::DriverError::InvalidConfig { .. }))
        ));
    }

    #[tokio::test]
    async fn test_failed_start_removes_generated_directory() {
        let base = tempfile::tempdir().unwrap();
        let result = SessionBuilder::new()
            .start_command("ansys1212121 -p abcd")
            .base_dir(base.path())
            .cleanup(true)
            .build()
            .await;

        assert!(matches!(
            result,
            Err(crate::Error::Transport(TransportError::ProcessStartFailure { .. }))
        ));
        assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
    }
}
