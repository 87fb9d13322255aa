//! Use cases
//!
//! The coordination runtime: patients with their timers, agents with their
//! command queues, escort arbitration between them and the coordinator
//! that ties a plan to all of it.

pub mod agent_executor;
pub mod arbitration;
pub mod coordinator;
pub mod events;
pub mod patient_runtime;
pub(crate) mod shared;

#[cfg(test)]
pub(crate) mod test_support;
