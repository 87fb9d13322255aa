//! Application-level configuration.
//!
//! - [`TimingPolicy`]: intervals, bounds and the speed multiplier
//! - [`CoordinatorConfig`]: what the coordinator needs besides its ports

pub mod coordinator_config;
pub mod timing;

pub use coordinator_config::CoordinatorConfig;
pub use timing::{MAX_DURATION, TimingPolicy};
