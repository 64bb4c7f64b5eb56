//! # mapdl-session
//!
//! Async driver for interactive MAPDL console sessions.
//!
//! The engine is started as a child process (or over SSH) and driven the way
//! an operator would drive it: one command line at a time, waiting for the
//! processor prompt (` BEGIN:`, ` PREP7:`, ...) before sending the next.
//!
//! ## Features
//!
//! - Prompt detection over chunked output, with ANSI escapes stripped
//! - ERROR blocks raised as errors; WARNING and NOTE blocks logged and collected
//! - Yes/no confirmation prompts detected instead of deadlocking
//! - Deferred command batches run as a single `/input`
//! - Scalar queries through `*get`, column listings, plot images
//! - Local or remote (SSH) engines
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mapdl_session::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mapdl_session::Error> {
//!     let mut session = Session::builder()
//!         .start_command("ansys150")
//!         .cleanup(true)
//!         .build()
//!         .await?;
//!
//!     session.send("/prep7\nn,1,0,0,0\nn,2,1,0,0").await?;
//!     let nodes = session.get(("node", "", "count")).await?;
//!     println!("{nodes} nodes");
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod driver;
pub mod error;
pub mod extract;
pub mod platform;
pub mod transport;

// Re-export main types for convenience
pub use driver::{Response, SendOptions, Session, SessionBuilder};
pub use error::Error;
pub use extract::{GetQuery, ListOptions, ScalarValue, Table};
pub use platform::EngineProfile;
pub use transport::{AuthMethod, HostKeyVerification, RemoteHost};
