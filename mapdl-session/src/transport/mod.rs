//! Remote transport layer wrapping russh.
//!
//! A remote session runs the engine on another machine over SSH with a PTY,
//! the equivalent of `ssh -t host 'cd <dir> && <command>'`. Once started, the
//! channel is treated as an opaque byte stream like a local child process.

pub mod config;
mod ssh;

pub use config::{AuthMethod, HostKeyVerification, RemoteHost};
pub use ssh::SshTransport;
