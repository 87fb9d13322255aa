//! Agent domain module
//!
//! Roles and executor states of the two mobile worker agents.
//! The executor itself lives in the application layer.

pub mod value_objects;

pub use value_objects::{AgentRole, AgentState};
