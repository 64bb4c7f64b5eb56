//! Engine profile: the prompt vocabulary and session hooks of one engine.

use crate::channel::PatternCatalog;

/// Engine-specific configuration: which banners mean what, and which
/// commands bracket every session.
///
/// The command/response protocol itself treats commands as opaque strings;
/// everything that depends on the engine's vocabulary lives here.
#[derive(Debug, Clone)]
pub struct EngineProfile {
    /// Profile name (e.g., "mapdl").
    pub name: String,

    /// Terminal, confirmation and diagnostic patterns.
    pub catalog: PatternCatalog,

    /// Start command used when neither the builder nor the environment gives one.
    pub default_start_command: String,

    /// Commands sent once the engine is ready (display defaults and the like).
    pub on_open_commands: Vec<String>,

    /// Commands sent on teardown. The last one is expected to end the process,
    /// so no prompt is awaited for any of them.
    pub on_close_commands: Vec<String>,
}

impl EngineProfile {
    /// Create a new profile with minimal required fields.
    pub fn new(name: impl Into<String>, catalog: PatternCatalog) -> Self {
        Self {
            name: name.into(),
            catalog,
            default_start_command: String::new(),
            on_open_commands: vec![],
            on_close_commands: vec![],
        }
    }

    /// Set the built-in start command.
    pub fn with_default_start_command(mut self, command: impl Into<String>) -> Self {
        self.default_start_command = command.into();
        self
    }

    /// Add an on_open command.
    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    /// Add an on_close command.
    pub fn with_on_close_command(mut self, command: impl Into<String>) -> Self {
        self.on_close_commands.push(command.into());
        self
    }

    /// Drop all on_open commands.
    pub fn without_on_open_commands(mut self) -> Self {
        self.on_open_commands.clear();
        self
    }
}
