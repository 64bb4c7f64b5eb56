//! Engine profiles.
//!
//! A profile names the prompt and diagnostic patterns of the driven engine
//! and the commands that bracket every session.

mod definition;
pub mod mapdl;

pub use definition::EngineProfile;
