//! Command domain module
//!
//! Commands are immutable values produced by the external planner and
//! consumed exactly once by the agent that owns them.
//!
//! - [`entities::Command`]: the typed command
//! - [`wire::WireCommand`]: the literal JSON shape exchanged with the planner

pub mod entities;
pub mod wire;

pub use entities::{Command, CommandAction};
pub use wire::WireCommand;
