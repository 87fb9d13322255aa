//! Infrastructure layer for ward-coordinator
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer, including configuration file loading.

pub mod config;
pub mod logging;
pub mod planner;
pub mod travel;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigValidationError, DEFAULT_PLANNER_URL, FileConfig, FileLocationConfig,
    FileLoggingConfig, FilePlannerConfig, FileTravelConfig, FileWardConfig,
};
pub use logging::JsonlScenarioLogger;
#[cfg(feature = "http-planner")]
pub use planner::HttpPlanner;
pub use planner::FilePlanner;
pub use travel::SimulatedTravel;
