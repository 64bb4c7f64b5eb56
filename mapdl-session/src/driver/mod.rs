//! Session layer: command dispatch and engine lifecycle.
//!
//! [`Dispatcher`] runs the command/response cycle over a process channel.
//! [`Session`] adds the working directory, the deferred [`CommandQueue`] and
//! startup and teardown of the engine process.

mod builder;
mod dispatcher;
mod queue;
mod response;
mod session;
mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::{START_COMMAND_ENV, SessionBuilder};
pub use dispatcher::{DispatchState, Dispatcher, OutputSink, SendOptions};
pub use queue::{CommandQueue, QUEUE_FILE};
pub use response::{Completion, DiagnosticBlock, Response};
pub use session::Session;
pub use workspace::Workspace;
