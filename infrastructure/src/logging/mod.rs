//! Logging infrastructure: structured scenario logging.
//!
//! Provides [`JsonlScenarioLogger`], a JSONL file writer that implements
//! the [`ScenarioLogger`](ward_application::ScenarioLogger) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlScenarioLogger;
