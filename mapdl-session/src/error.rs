//! Error types for mapdl-session.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for mapdl-session operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Process spawn and SSH transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Driver-level errors
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Value and table extraction errors
    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),
}

/// Transport layer errors (process spawn, SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// The engine could not be started, or exited before its first prompt
    #[error("Failed to start '{command}': {reason}")]
    ProcessStartFailure { command: String, reason: String },

    /// Failed to connect to a remote host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// The host presented a key that differs from known_hosts
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Strict verification rejected a host missing from known_hosts
    #[error("Host {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (reading, writing, pattern compilation).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The process ended before a terminal prompt was seen
    #[error("Engine output ended while running '{command}'")]
    UnexpectedEof { command: String, output: String },

    /// Channel closed
    #[error("Channel closed")]
    Closed,

    /// Write to the process failed
    #[error("Channel I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Driver layer errors (command execution, session lifecycle).
#[derive(Error, Debug)]
pub enum DriverError {
    /// The engine reported an ERROR diagnostic block
    #[error("{block}")]
    EngineRuntime { command: String, block: String },

    /// The session's process has ended
    #[error("Session closed - the engine process has exited")]
    SessionClosed,

    /// Invalid configuration in the session builder
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Working directory or scratch file operation failed
    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from value and table extraction.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// A scalar query did not substitute the sentinel
    #[error("'{query}' did not yield any value (got '{line}')")]
    NoValue { query: String, line: String },

    /// No run of uniformly shaped lines was found
    #[error("No column data found in {}", path.display())]
    HeaderDetectionFailure { path: PathBuf },

    /// Reading a redirected output file failed
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DriverError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: io::Error) -> Self {
        DriverError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias using mapdl-session's Error.
pub type Result<T> = std::result::Result<T, Error>;
