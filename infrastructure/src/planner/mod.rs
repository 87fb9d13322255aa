//! Planner adapters: implementations of the
//! [`PlannerPort`](ward_application::PlannerPort).

mod file;
#[cfg(feature = "http-planner")]
mod http;

pub use file::FilePlanner;
#[cfg(feature = "http-planner")]
pub use http::HttpPlanner;
