//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure and presentation adapters
//! must implement.

pub mod planner;
pub mod progress;
pub mod scenario_logger;
pub mod travel;
